use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use crate::auth::lockout::{FailureOutcome, LockoutPolicy};
use crate::error::AppError;
use crate::models::User;

pub const USER_COLUMNS: &str = "id, username, email, password_hash, display_name, \
     two_factor_secret, two_factor_enabled, backup_codes, failed_login_attempts, locked_until, \
     last_login_at, preferences, created_at, updated_at, deleted_at";

/// Active (not deleted) user by id.
pub async fn find_by_id<'e, E: PgExecutor<'e>>(
    executor: E,
    id: i32,
) -> Result<Option<User>, AppError> {
    let sql = format!(
        "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
        USER_COLUMNS
    );
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(user)
}

/// Like `find_by_id`, but a missing user is an error.
pub async fn get(pool: &PgPool, id: i32) -> Result<User, AppError> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Active user by email, compared case-insensitively.
pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, AppError> {
    let sql = format!(
        "SELECT {} FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL",
        USER_COLUMNS
    );
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn email_taken(pool: &PgPool, email: &str) -> Result<bool, AppError> {
    let taken = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1))")
        .bind(email.trim())
        .fetch_one(pool)
        .await?;
    Ok(taken)
}

pub async fn username_taken(pool: &PgPool, username: &str) -> Result<bool, AppError> {
    let taken =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE lower(username) = lower($1))")
            .bind(username)
            .fetch_one(pool)
            .await?;
    Ok(taken)
}

pub async fn create<'e, E: PgExecutor<'e>>(
    executor: E,
    username: &str,
    email: &str,
    password_hash: Option<&str>,
    display_name: Option<&str>,
) -> Result<User, AppError> {
    let sql = format!(
        "INSERT INTO users (username, email, password_hash, display_name) \
         VALUES ($1, $2, $3, $4) RETURNING {}",
        USER_COLUMNS
    );
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(username)
        .bind(email.trim().to_lowercase())
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(executor)
        .await?;
    Ok(user)
}

/// Turns free text into something that passes username validation.
pub fn username_base(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(24)
        .collect();
    let cleaned = cleaned.trim_matches('_').to_string();
    if cleaned.len() < 3 {
        format!("user_{}", cleaned)
    } else {
        cleaned
    }
}

/// First free username among `base`, `base2`, `base3`, ...
pub async fn unique_username(pool: &PgPool, raw: &str) -> Result<String, AppError> {
    let base = username_base(raw);
    if !username_taken(pool, &base).await? {
        return Ok(base);
    }
    for suffix in 2..1000 {
        let candidate = format!("{}{}", base, suffix);
        if !username_taken(pool, &candidate).await? {
            return Ok(candidate);
        }
    }
    Ok(format!("{}_{}", base, &uuid::Uuid::new_v4().simple().to_string()[..6]))
}

/// Counts a failed login in a single statement and locks the account once the
/// counter reaches `policy.max_attempts`. Returns the row as written.
pub async fn record_failed_login(
    pool: &PgPool,
    id: i32,
    policy: &LockoutPolicy,
) -> Result<FailureOutcome, AppError> {
    let (attempts, locked_until) = sqlx::query_as::<_, (i32, Option<DateTime<Utc>>)>(
        "UPDATE users SET \
         failed_login_attempts = CASE WHEN failed_login_attempts + 1 >= $2 THEN 0 \
             ELSE failed_login_attempts + 1 END, \
         locked_until = CASE WHEN failed_login_attempts + 1 >= $2 \
             THEN NOW() + make_interval(secs => $3) ELSE locked_until END, \
         updated_at = NOW() \
         WHERE id = $1 RETURNING failed_login_attempts, locked_until",
    )
    .bind(id)
    .bind(policy.max_attempts)
    .bind(policy.duration.num_seconds() as f64)
    .fetch_one(pool)
    .await?;
    Ok(policy.outcome(attempts, locked_until))
}

pub async fn record_successful_login(pool: &PgPool, id: i32) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE users SET failed_login_attempts = 0, locked_until = NULL, \
         last_login_at = NOW(), updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Removes `code_hash` from the stored backup codes. Returns the number of codes
/// left, or `None` when the hash was not present; only one caller can win a code.
pub async fn consume_backup_code(
    pool: &PgPool,
    id: i32,
    code_hash: &str,
) -> Result<Option<i32>, AppError> {
    let remaining = sqlx::query_scalar::<_, i32>(
        "UPDATE users SET backup_codes = array_remove(backup_codes, $2), updated_at = NOW() \
         WHERE id = $1 AND $2 = ANY(backup_codes) \
         RETURNING COALESCE(cardinality(backup_codes), 0)",
    )
    .bind(id)
    .bind(code_hash)
    .fetch_optional(pool)
    .await?;
    Ok(remaining)
}

/// Stores the two-factor state as a whole; `secret = None` disables it.
pub async fn set_two_factor(
    pool: &PgPool,
    id: i32,
    secret: Option<&str>,
    enabled: bool,
    backup_codes: &[String],
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE users SET two_factor_secret = $2, two_factor_enabled = $3, backup_codes = $4, \
         updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(secret)
    .bind(enabled)
    .bind(backup_codes)
    .execute(pool)
    .await?;
    Ok(())
}
