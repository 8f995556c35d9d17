use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

use super::preferences::Preferences;

lazy_static::lazy_static! {
    // Regex for username validation: alphanumeric, underscores, hyphens
    pub static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// A user row. Never serialized directly; see `UserProfile`.
#[derive(Debug, FromRow, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    /// `None` for accounts created through OAuth that never set a password.
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub two_factor_secret: Option<String>,
    pub two_factor_enabled: bool,
    pub backup_codes: Vec<String>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub preferences: Json<Preferences>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The public view of a user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub two_factor_enabled: bool,
    pub has_password: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            two_factor_enabled: user.two_factor_enabled,
            has_password: user.password_hash.is_some(),
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileInput {
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: Option<String>,
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordInput {
    /// Required unless the account has no password yet (OAuth-only).
    pub current_password: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeleteAccountInput {
    pub password: Option<String>,
}
