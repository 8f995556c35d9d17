use actix_web::{delete, get, post, web, HttpResponse, Responder};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::{self, AuditEntry},
    auth::{api_key, AuthenticatedUser, ClientInfo},
    error::AppError,
    models::{ApiKey, CreateApiKeyInput, CreatedApiKey},
    state::AppState,
};

const API_KEY_COLUMNS: &str =
    "id, name, key_prefix, last_used_at, expires_at, revoked_at, created_at";

#[get("")]
pub async fn list_api_keys(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT {} FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
        API_KEY_COLUMNS
    );
    let keys = sqlx::query_as::<_, ApiKey>(&sql)
        .bind(user.user_id)
        .fetch_all(&state.pool)
        .await?;
    Ok(HttpResponse::Ok().json(keys))
}

/// Creates a key. The plaintext key is only ever returned by this call.
///
/// Requires a login session, so a leaked key cannot mint more keys.
#[post("")]
pub async fn create_api_key(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    body: web::Json<CreateApiKeyInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    user.require_session()?;

    let generated = api_key::generate();
    let expires_at = body
        .expires_in_days
        .map(|days| Utc::now() + Duration::days(days));

    let sql = format!(
        "INSERT INTO api_keys (id, user_id, name, key_prefix, key_hash, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
        API_KEY_COLUMNS
    );
    let key = sqlx::query_as::<_, ApiKey>(&sql)
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(body.name.trim())
        .bind(&generated.prefix)
        .bind(&generated.hash)
        .bind(expires_at)
        .fetch_one(&state.pool)
        .await?;

    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.user_id), audit::API_KEY_CREATED)
            .resource("api_key", key.id)
            .metadata(json!({ "name": key.name, "prefix": key.key_prefix }))
            .client(client.ip_address, client.user_agent),
    )
    .await;

    Ok(HttpResponse::Created().json(CreatedApiKey {
        api_key: key,
        key: generated.plaintext,
    }))
}

#[delete("/{id}")]
pub async fn revoke_api_key(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    key_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let key_id = key_id.into_inner();
    let result = sqlx::query(
        "UPDATE api_keys SET revoked_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL",
    )
    .bind(key_id)
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("API key not found".into()));
    }

    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.user_id), audit::API_KEY_REVOKED)
            .resource("api_key", key_id)
            .client(client.ip_address, client.user_agent),
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}
