use actix_web::{
    delete, get,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    post, web, HttpResponse, Responder,
};
use serde_json::json;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::{AuthenticatedUser, ClientInfo},
    error::AppError,
    models::{CreateExportInput, ExportJob, ExportStatus, PageParams},
    state::AppState,
};

const EXPORT_COLUMNS: &str = "id, user_id, format, status, filters, file_name, row_count, error, \
     created_at, started_at, completed_at";

async fn find_job(state: &AppState, user_id: i32, id: Uuid) -> Result<ExportJob, AppError> {
    let sql = format!(
        "SELECT {} FROM export_jobs WHERE id = $1 AND user_id = $2",
        EXPORT_COLUMNS
    );
    sqlx::query_as::<_, ExportJob>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Export not found".into()))
}

/// Queues an export of the caller's todos.
///
/// ## Responses:
/// - `202 Accepted`: the pending job. Poll `GET /api/exports/{id}` or wait for
///   an `export.completed` event, then download.
#[post("")]
pub async fn create_export(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    body: web::Json<CreateExportInput>,
) -> Result<impl Responder, AppError> {
    let input = body.into_inner();
    let sql = format!(
        "INSERT INTO export_jobs (id, user_id, format, filters) VALUES ($1, $2, $3, $4) RETURNING {}",
        EXPORT_COLUMNS
    );
    let job = sqlx::query_as::<_, ExportJob>(&sql)
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(input.format)
        .bind(Json(&input.filters))
        .fetch_one(&state.pool)
        .await?;

    state.exports.enqueue(job.id);
    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.user_id), audit::EXPORT_REQUESTED)
            .resource("export_job", job.id)
            .metadata(json!({ "format": input.format }))
            .client(client.ip_address, client.user_agent),
    )
    .await;

    Ok(HttpResponse::Accepted().json(job))
}

#[get("")]
pub async fn list_exports(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<PageParams>,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT {} FROM export_jobs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        EXPORT_COLUMNS
    );
    let jobs = sqlx::query_as::<_, ExportJob>(&sql)
        .bind(user.user_id)
        .bind(query.limit(20, 100))
        .bind(query.offset())
        .fetch_all(&state.pool)
        .await?;
    Ok(HttpResponse::Ok().json(jobs))
}

#[get("/{id}")]
pub async fn get_export(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    job_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let job = find_job(&state, user.user_id, job_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(job))
}

/// Streams the rendered file. `409 Conflict` while the job is not completed.
#[get("/{id}/download")]
pub async fn download_export(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    job_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let job = find_job(&state, user.user_id, job_id.into_inner()).await?;
    if job.status != ExportStatus::Completed {
        return Err(AppError::Conflict(format!(
            "Export is not ready (status: {})",
            format!("{:?}", job.status).to_lowercase()
        )));
    }

    let content: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT content FROM export_jobs WHERE id = $1")
            .bind(job.id)
            .fetch_one(&state.pool)
            .await?;
    let content =
        content.ok_or_else(|| AppError::InternalServerError("Export has no content".into()))?;
    let file_name = job
        .file_name
        .clone()
        .unwrap_or_else(|| format!("export.{}", job.format.extension()));

    Ok(HttpResponse::Ok()
        .content_type(job.format.content_type())
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file_name)],
        })
        .body(content))
}

#[delete("/{id}")]
pub async fn delete_export(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    job_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let result = sqlx::query("DELETE FROM export_jobs WHERE id = $1 AND user_id = $2")
        .bind(job_id.into_inner())
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Export not found".into()));
    }
    Ok(HttpResponse::NoContent().finish())
}
