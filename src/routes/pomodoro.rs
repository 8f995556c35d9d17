use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    db,
    error::AppError,
    models::{
        NextPhase, PomodoroSessionRecord, PomodoroStats, PomodoroStatsQuery, RecordPomodoroInput,
    },
    productivity::pomodoro::{PomodoroPhase, PomodoroTimer},
    state::AppState,
};

const SESSION_COLUMNS: &str =
    "id, user_id, todo_id, phase, started_at, ended_at, duration_seconds, completed";

/// Stores a phase the client has finished or skipped.
#[post("/sessions")]
pub async fn record_session(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<RecordPomodoroInput>,
) -> Result<impl Responder, AppError> {
    let duration_seconds = body
        .duration_seconds()
        .ok_or_else(|| AppError::BadRequest("`ended_at` must be after `started_at`".into()))?;
    if let Some(todo_id) = body.todo_id {
        db::todos::find(&state.pool, user.user_id, todo_id, false).await?;
    }

    let sql = format!(
        "INSERT INTO pomodoro_sessions (id, user_id, todo_id, phase, started_at, ended_at, \
         duration_seconds, completed) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
        SESSION_COLUMNS
    );
    let record = sqlx::query_as::<_, PomodoroSessionRecord>(&sql)
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(body.todo_id)
        .bind(body.phase)
        .bind(body.started_at)
        .bind(body.ended_at)
        .bind(duration_seconds)
        .bind(body.completed)
        .fetch_one(&state.pool)
        .await?;
    Ok(HttpResponse::Created().json(record))
}

/// Totals over the last `days` days (default 7).
#[get("/stats")]
pub async fn pomodoro_stats(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<PomodoroStatsQuery>,
) -> Result<impl Responder, AppError> {
    let days = query.days();
    let since = Utc::now() - Duration::days(days);
    let (work_sessions, skipped_sessions, break_sessions, focus_seconds, break_seconds): (
        i64,
        i64,
        i64,
        i64,
        i64,
    ) = sqlx::query_as(
        "SELECT \
         COUNT(*) FILTER (WHERE phase = 'work' AND completed), \
         COUNT(*) FILTER (WHERE phase = 'work' AND NOT completed), \
         COUNT(*) FILTER (WHERE phase <> 'work'), \
         COALESCE(SUM(duration_seconds) FILTER (WHERE phase = 'work'), 0)::bigint, \
         COALESCE(SUM(duration_seconds) FILTER (WHERE phase <> 'work'), 0)::bigint \
         FROM pomodoro_sessions WHERE user_id = $1 AND started_at >= $2",
    )
    .bind(user.user_id)
    .bind(since)
    .fetch_one(&state.pool)
    .await?;

    Ok(HttpResponse::Ok().json(PomodoroStats {
        days,
        work_sessions,
        skipped_sessions,
        break_sessions,
        focus_seconds,
        break_seconds,
    }))
}

/// Suggests the next phase by replaying today's recorded sessions through a
/// timer built from the caller's pomodoro settings.
#[get("/next")]
pub async fn next_phase(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let account = db::users::get(&state.pool, user.user_id).await?;
    let settings = account.preferences.0.pomodoro;
    let today = db::start_of_day(Utc::now());

    let history: Vec<(PomodoroPhase, bool)> = sqlx::query_as(
        "SELECT phase, completed FROM pomodoro_sessions \
         WHERE user_id = $1 AND started_at >= $2 ORDER BY ended_at ASC",
    )
    .bind(user.user_id)
    .bind(today)
    .fetch_all(&state.pool)
    .await?;

    let timer = PomodoroTimer::replay(settings.clone(), &history);
    Ok(HttpResponse::Ok().json(NextPhase {
        phase: timer.phase(),
        duration_seconds: settings.duration_of(timer.phase()).as_secs(),
        completed_work_sessions_today: timer.completed_work_sessions(),
    }))
}
