//! Background processing of export jobs.
//!
//! Jobs are rows in `export_jobs`. The worker receives job ids over a channel,
//! so a request handler only inserts the row and enqueues the id. Jobs left
//! `pending` or `processing` by a previous process are picked up again at
//! startup.

use chrono::Utc;
use serde_json::json;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::events::{EventBroadcaster, EventKind};
use crate::models::{ExportFilters, ExportFormat};

#[derive(Debug, sqlx::FromRow)]
struct ClaimedJob {
    user_id: i32,
    format: ExportFormat,
    filters: Json<ExportFilters>,
}

/// Handle for submitting export jobs.
#[derive(Clone)]
pub struct ExportWorker {
    sender: mpsc::UnboundedSender<Uuid>,
}

impl ExportWorker {
    /// Spawns the processing loop on the current Tokio runtime.
    pub fn start(pool: PgPool, events: EventBroadcaster) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(pool, events, receiver));
        log::info!("Export worker started");
        Self { sender }
    }

    pub fn enqueue(&self, job_id: Uuid) {
        if self.sender.send(job_id).is_err() {
            log::error!("Export worker is not running; job {} stays pending", job_id);
        }
    }

    /// Enqueues jobs that never finished. Returns how many were found.
    pub async fn resume_unfinished(&self, pool: &PgPool) -> Result<usize, AppError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM export_jobs WHERE status IN ('pending', 'processing') ORDER BY created_at",
        )
        .fetch_all(pool)
        .await?;
        for id in &ids {
            self.enqueue(*id);
        }
        if !ids.is_empty() {
            log::info!("Resuming {} unfinished export job(s)", ids.len());
        }
        Ok(ids.len())
    }
}

async fn run(pool: PgPool, events: EventBroadcaster, mut receiver: mpsc::UnboundedReceiver<Uuid>) {
    while let Some(job_id) = receiver.recv().await {
        if let Err(e) = process(&pool, &events, job_id).await {
            log::error!("Export job {} failed: {}", job_id, e);
        }
    }
    log::info!("Export worker stopped");
}

/// Runs one job to completion. Rendering errors mark the job failed; only
/// bookkeeping errors are returned.
pub async fn process(
    pool: &PgPool,
    events: &EventBroadcaster,
    job_id: Uuid,
) -> Result<(), AppError> {
    // Claiming moves the job to `processing`; a job claimed twice is skipped.
    let claimed = sqlx::query_as::<_, ClaimedJob>(
        "UPDATE export_jobs SET status = 'processing', started_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'processing') \
         RETURNING user_id, format, filters",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    let Some(job) = claimed else {
        log::debug!("Export job {} is gone or already finished", job_id);
        return Ok(());
    };

    match build(pool, &job).await {
        Ok((file_name, content, row_count)) => {
            sqlx::query(
                "UPDATE export_jobs SET status = 'completed', file_name = $2, content = $3, \
                 row_count = $4, error = NULL, completed_at = NOW() WHERE id = $1",
            )
            .bind(job_id)
            .bind(&file_name)
            .bind(&content)
            .bind(row_count)
            .execute(pool)
            .await?;
            log::info!(
                "Export job {} completed: {} rows, {} bytes",
                job_id,
                row_count,
                content.len()
            );
            events.publish(
                EventKind::ExportCompleted,
                job.user_id,
                Some(job_id),
                json!({ "file_name": file_name, "row_count": row_count }),
            );
        }
        Err(e) => {
            let message = e.to_string();
            sqlx::query(
                "UPDATE export_jobs SET status = 'failed', error = $2, completed_at = NOW() WHERE id = $1",
            )
            .bind(job_id)
            .bind(&message)
            .execute(pool)
            .await?;
            log::warn!("Export job {} failed: {}", job_id, message);
            events.publish(
                EventKind::ExportFailed,
                job.user_id,
                Some(job_id),
                json!({ "error": message }),
            );
        }
    }
    Ok(())
}

async fn build(pool: &PgPool, job: &ClaimedJob) -> Result<(String, Vec<u8>, i32), AppError> {
    let rows = db::todos::export_rows(pool, job.user_id, &job.filters.0).await?;
    let now = Utc::now();
    let content = super::render(job.format, &rows, now)?;
    let row_count = i32::try_from(rows.len())
        .map_err(|_| AppError::InternalServerError("Export too large".into()))?;
    Ok((super::file_name(job.format, now), content, row_count))
}
