use actix_web::{delete, get, web, HttpResponse, Responder};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit::{self, AuditEntry},
    auth::{AuthenticatedUser, ClientInfo},
    error::AppError,
    sessions::Session,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    /// Whether this is the session making the request.
    pub current: bool,
}

/// Lists the caller's live sessions, newest first.
#[get("")]
pub async fn list_sessions(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let sessions: Vec<SessionView> = state
        .sessions
        .list_for_user(user.user_id)
        .await?
        .into_iter()
        .map(|session| SessionView {
            current: Some(session.id) == user.session_id,
            session,
        })
        .collect();
    Ok(HttpResponse::Ok().json(sessions))
}

/// Revokes one of the caller's sessions. Tokens bound to it stop working at once.
#[delete("/{id}")]
pub async fn revoke_session(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    session_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let session_id = session_id.into_inner();
    let owned = state
        .sessions
        .get(session_id)
        .await?
        .map(|session| session.user_id == user.user_id)
        .unwrap_or(false);
    if !owned {
        return Err(AppError::NotFound("Session not found".into()));
    }

    state.sessions.delete(session_id).await?;
    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.user_id), audit::SESSION_REVOKED)
            .resource("session", session_id)
            .client(client.ip_address, client.user_agent),
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}
