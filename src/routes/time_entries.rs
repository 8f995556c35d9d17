use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    db,
    error::AppError,
    models::{StartTimerInput, TimeEntry, TimeSummary, TimeSummaryQuery},
    state::AppState,
};

const ENTRY_COLUMNS: &str = "id, user_id, todo_id, started_at, ended_at, duration_seconds, note";

/// Summaries without `from` cover the last 30 days.
const DEFAULT_SUMMARY_DAYS: i64 = 30;

/// Stops the caller's running timer, if any.
async fn stop_running(
    conn: &mut sqlx::PgConnection,
    user_id: i32,
) -> Result<Option<TimeEntry>, AppError> {
    let sql = format!(
        "UPDATE time_entries SET ended_at = NOW(), \
         duration_seconds = GREATEST(EXTRACT(EPOCH FROM (NOW() - started_at))::int, 0) \
         WHERE user_id = $1 AND ended_at IS NULL RETURNING {}",
        ENTRY_COLUMNS
    );
    let stopped = sqlx::query_as::<_, TimeEntry>(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(stopped)
}

/// Starts a timer on a todo. A timer already running on any todo is stopped first.
#[post("/{id}/timer/start")]
pub async fn start_timer(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
    body: Option<web::Json<StartTimerInput>>,
) -> Result<impl Responder, AppError> {
    let input = body.map(|b| b.into_inner()).unwrap_or_default();
    input.validate()?;
    let todo_id = todo_id.into_inner();

    let mut tx = state.pool.begin().await?;
    db::todos::find(&mut *tx, user.user_id, todo_id, false).await?;
    if let Some(previous) = stop_running(&mut tx, user.user_id).await? {
        log::debug!(
            "Stopped timer {} on todo {} before starting a new one",
            previous.id,
            previous.todo_id
        );
    }

    let sql = format!(
        "INSERT INTO time_entries (id, user_id, todo_id, started_at, note) \
         VALUES ($1, $2, $3, NOW(), $4) RETURNING {}",
        ENTRY_COLUMNS
    );
    let entry = sqlx::query_as::<_, TimeEntry>(&sql)
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(todo_id)
        .bind(&input.note)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(HttpResponse::Created().json(entry))
}

/// Every time entry recorded for one todo, newest first.
#[get("/{id}/time-entries")]
pub async fn list_todo_entries(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let todo_id = todo_id.into_inner();
    db::todos::find(&state.pool, user.user_id, todo_id, true).await?;

    let sql = format!(
        "SELECT {} FROM time_entries WHERE user_id = $1 AND todo_id = $2 ORDER BY started_at DESC",
        ENTRY_COLUMNS
    );
    let entries = sqlx::query_as::<_, TimeEntry>(&sql)
        .bind(user.user_id)
        .bind(todo_id)
        .fetch_all(&state.pool)
        .await?;
    Ok(HttpResponse::Ok().json(entries))
}

#[post("/stop")]
pub async fn stop_timer(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let mut conn = state.pool.acquire().await?;
    let entry = stop_running(&mut conn, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No timer is running".into()))?;
    Ok(HttpResponse::Ok().json(entry))
}

/// The running timer, or `null`.
#[get("/current")]
pub async fn current_timer(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT {} FROM time_entries WHERE user_id = $1 AND ended_at IS NULL",
        ENTRY_COLUMNS
    );
    let entry = sqlx::query_as::<_, TimeEntry>(&sql)
        .bind(user.user_id)
        .fetch_optional(&state.pool)
        .await?;
    Ok(HttpResponse::Ok().json(entry))
}

/// Tracked seconds per todo between `from` and `to`, largest first.
/// A running entry counts up to now.
#[get("/summary")]
pub async fn time_summary(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<TimeSummaryQuery>,
) -> Result<impl Responder, AppError> {
    let to = query.to.unwrap_or_else(Utc::now);
    let from = query
        .from
        .unwrap_or_else(|| to - Duration::days(DEFAULT_SUMMARY_DAYS));
    if from > to {
        return Err(AppError::BadRequest("`from` must not be after `to`".into()));
    }

    let summary = sqlx::query_as::<_, TimeSummary>(
        "SELECT e.todo_id, t.title, COUNT(*) AS entries, \
         COALESCE(SUM(COALESCE(e.duration_seconds, \
             EXTRACT(EPOCH FROM (NOW() - e.started_at))::int)), 0)::bigint AS total_seconds \
         FROM time_entries e JOIN todos t ON t.id = e.todo_id \
         WHERE e.user_id = $1 AND e.started_at >= $2 AND e.started_at < $3 \
         GROUP BY e.todo_id, t.title ORDER BY total_seconds DESC",
    )
    .bind(user.user_id)
    .bind(from)
    .bind(to)
    .fetch_all(&state.pool)
    .await?;
    Ok(HttpResponse::Ok().json(summary))
}
