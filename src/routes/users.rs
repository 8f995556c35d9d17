use actix_web::{delete, get, put, web, HttpResponse, Responder};
use serde_json::json;
use sqlx::types::Json;
use validator::Validate;

use crate::{
    audit::{self, AuditEntry},
    auth::{hash_password, validate_password_strength, verify_password, AuthenticatedUser, ClientInfo},
    db,
    error::AppError,
    models::{ChangePasswordInput, DeleteAccountInput, Preferences, UpdateProfileInput, UserProfile},
    state::AppState,
};

#[get("/me")]
pub async fn get_me(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let account = db::users::get(&state.pool, user.user_id).await?;
    Ok(HttpResponse::Ok().json(UserProfile::from(&account)))
}

/// Changes username and/or display name. Omitted fields are left alone.
#[put("/me")]
pub async fn update_me(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<UpdateProfileInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let account = db::users::get(&state.pool, user.user_id).await?;

    if let Some(username) = &body.username {
        if !username.eq_ignore_ascii_case(&account.username)
            && db::users::username_taken(&state.pool, username).await?
        {
            return Err(AppError::Conflict("Username already taken".into()));
        }
    }

    sqlx::query(
        "UPDATE users SET username = COALESCE($2, username), \
         display_name = COALESCE($3, display_name), updated_at = NOW() WHERE id = $1",
    )
    .bind(account.id)
    .bind(&body.username)
    .bind(&body.display_name)
    .execute(&state.pool)
    .await?;

    let updated = db::users::get(&state.pool, account.id).await?;
    Ok(HttpResponse::Ok().json(UserProfile::from(&updated)))
}

/// Sets a new password and signs out every other session.
///
/// Accounts created through OAuth have no password yet and may set one without
/// `current_password`.
#[put("/me/password")]
pub async fn change_password(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    body: web::Json<ChangePasswordInput>,
) -> Result<impl Responder, AppError> {
    let session_id = user.require_session()?;
    body.validate()?;
    validate_password_strength(&body.new_password)?;
    let account = db::users::get(&state.pool, user.user_id).await?;

    if let Some(current_hash) = account.password_hash.as_deref() {
        let current = body.current_password.as_deref().unwrap_or_default();
        if !verify_password(current, current_hash)? {
            return Err(AppError::Unauthorized("Current password is incorrect".into()));
        }
    }

    let new_hash = hash_password(&body.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(account.id)
        .bind(&new_hash)
        .execute(&state.pool)
        .await?;

    let revoked = state
        .sessions
        .delete_all_for_user(account.id, Some(session_id))
        .await?;
    audit::record(
        &state.pool,
        AuditEntry::new(Some(account.id), audit::USER_PASSWORD_CHANGED)
            .metadata(json!({ "revoked_sessions": revoked }))
            .client(client.ip_address, client.user_agent),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "revoked_sessions": revoked })))
}

/// Soft-deletes the account and revokes all of its sessions and API keys.
///
/// Email and username are released so they can be registered again.
#[delete("/me")]
pub async fn delete_me(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    body: Option<web::Json<DeleteAccountInput>>,
) -> Result<impl Responder, AppError> {
    user.require_session()?;
    let input = body.map(|b| b.into_inner()).unwrap_or_default();
    let account = db::users::get(&state.pool, user.user_id).await?;

    if let Some(password_hash) = account.password_hash.as_deref() {
        let password = input.password.as_deref().unwrap_or_default();
        if !verify_password(password, password_hash)? {
            return Err(AppError::Unauthorized("Password is incorrect".into()));
        }
    }

    sqlx::query(
        "UPDATE users SET deleted_at = NOW(), updated_at = NOW(), \
         email = 'deleted-' || id || '@deleted.invalid', username = 'deleted-' || id, \
         password_hash = NULL, two_factor_secret = NULL, two_factor_enabled = FALSE, \
         backup_codes = '{}' WHERE id = $1",
    )
    .bind(account.id)
    .execute(&state.pool)
    .await?;
    sqlx::query("DELETE FROM oauth_accounts WHERE user_id = $1")
        .bind(account.id)
        .execute(&state.pool)
        .await?;

    let revoked_keys = db::api_keys::revoke_all(&state.pool, account.id).await?;
    let revoked_sessions = state.sessions.delete_all_for_user(account.id, None).await?;
    log::info!("Deleted user {}", account.id);

    audit::record(
        &state.pool,
        AuditEntry::new(Some(account.id), audit::USER_DELETED)
            .metadata(json!({
                "revoked_sessions": revoked_sessions,
                "revoked_api_keys": revoked_keys,
            }))
            .client(client.ip_address, client.user_agent),
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/me/preferences")]
pub async fn get_preferences(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let account = db::users::get(&state.pool, user.user_id).await?;
    Ok(HttpResponse::Ok().json(account.preferences.0))
}

/// Replaces the stored preferences. Missing fields take their defaults.
#[put("/me/preferences")]
pub async fn update_preferences(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<Preferences>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let preferences = body.into_inner();
    sqlx::query("UPDATE users SET preferences = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
        .bind(user.user_id)
        .bind(Json(&preferences))
        .execute(&state.pool)
        .await?;
    Ok(HttpResponse::Ok().json(preferences))
}
