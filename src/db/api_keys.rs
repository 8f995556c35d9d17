use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

const USABLE: &str = "api_keys.revoked_at IS NULL \
     AND (api_keys.expires_at IS NULL OR api_keys.expires_at > NOW()) \
     AND users.id = api_keys.user_id AND users.deleted_at IS NULL";

/// Key id and owner of the key with this hash, if the key is usable. Marks the key as used.
///
/// Revoked and expired keys, and keys of deleted users, resolve to `None`.
pub async fn resolve(pool: &PgPool, key_hash: &str) -> Result<Option<(Uuid, i32)>, AppError> {
    let sql = format!(
        "UPDATE api_keys SET last_used_at = NOW() FROM users \
         WHERE api_keys.key_hash = $1 AND {} \
         RETURNING api_keys.id, api_keys.user_id",
        USABLE
    );
    let key = sqlx::query_as::<_, (Uuid, i32)>(&sql)
        .bind(key_hash)
        .fetch_optional(pool)
        .await?;
    Ok(key)
}

/// Whether the key can still authenticate, without marking it as used.
pub async fn is_usable(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM api_keys JOIN users ON users.id = api_keys.user_id \
         WHERE api_keys.id = $1 AND {})",
        USABLE
    );
    let usable = sqlx::query_scalar::<_, bool>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(usable)
}

/// Revokes every key of a user. Returns how many were revoked.
pub async fn revoke_all(pool: &PgPool, user_id: i32) -> Result<u64, AppError> {
    let result = sqlx::query(
        "UPDATE api_keys SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
