//! Security audit trail.
//!
//! Recording is best effort: a failed insert is logged and swallowed so that
//! auditing never turns a successful request into an error.

use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuditLog, AuditQuery};

pub const USER_REGISTER: &str = "user.register";
pub const USER_LOGIN: &str = "user.login";
pub const USER_LOGIN_FAILED: &str = "user.login_failed";
pub const USER_LOCKED: &str = "user.locked";
pub const USER_LOGOUT: &str = "user.logout";
pub const USER_PASSWORD_CHANGED: &str = "user.password_changed";
pub const USER_DELETED: &str = "user.deleted";
pub const TWO_FACTOR_ENABLED: &str = "two_factor.enabled";
pub const TWO_FACTOR_DISABLED: &str = "two_factor.disabled";
pub const OAUTH_LOGIN: &str = "oauth.login";
pub const API_KEY_CREATED: &str = "api_key.created";
pub const API_KEY_REVOKED: &str = "api_key.revoked";
pub const SESSION_REVOKED: &str = "session.revoked";
pub const EXPORT_REQUESTED: &str = "export.requested";
pub const TODO_BULK: &str = "todo.bulk";

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// One audit record before it is stored.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<i32>,
    pub action: &'static str,
    pub resource_type: Option<&'static str>,
    pub resource_id: Option<String>,
    pub metadata: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEntry {
    pub fn new(user_id: Option<i32>, action: &'static str) -> Self {
        Self {
            user_id,
            action,
            resource_type: None,
            resource_id: None,
            metadata: Value::Object(Default::default()),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn resource(mut self, resource_type: &'static str, id: impl ToString) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

pub async fn record(pool: &PgPool, entry: AuditEntry) {
    let result = sqlx::query(
        "INSERT INTO audit_logs (id, user_id, action, resource_type, resource_id, metadata, \
         ip_address, user_agent) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.resource_type)
    .bind(&entry.resource_id)
    .bind(Json(&entry.metadata))
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .execute(pool)
    .await;

    if let Err(e) = result {
        log::warn!("Failed to record audit event {}: {}", entry.action, e);
    }
}

/// Newest first.
pub async fn list_for_user(
    pool: &PgPool,
    user_id: i32,
    query: &AuditQuery,
) -> Result<Vec<AuditLog>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let logs = sqlx::query_as::<_, AuditLog>(
        "SELECT id, user_id, action, resource_type, resource_id, metadata, ip_address, \
         user_agent, created_at FROM audit_logs \
         WHERE user_id = $1 AND ($2::text IS NULL OR action = $2) \
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(user_id)
    .bind(query.action.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(logs)
}
