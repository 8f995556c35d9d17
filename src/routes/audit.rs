use actix_web::{get, web, HttpResponse, Responder};

use crate::{
    audit, auth::AuthenticatedUser, error::AppError, models::AuditQuery, state::AppState,
};

/// The caller's own audit trail, newest first. Supports `action`, `limit` and `offset`.
#[get("")]
pub async fn list_audit_logs(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<AuditQuery>,
) -> Result<impl Responder, AppError> {
    let logs = audit::list_for_user(&state.pool, user.user_id, &query).await?;
    Ok(HttpResponse::Ok().json(logs))
}
