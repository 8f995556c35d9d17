pub mod api_key;
pub mod extractors;
pub mod lockout;
pub mod middleware;
pub mod password;
pub mod token;
pub mod totp;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub use extractors::{AuthenticatedUser, ClientInfo, CredentialKind};
pub use middleware::AuthMiddleware;
pub use password::{hash_password, validate_password_strength, verify_password};
pub use token::{Claims, TokenPurpose, TokenService};

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// User's email address.
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    /// TOTP or backup code, for accounts with two-factor authentication.
    /// When absent such accounts receive a challenge token instead.
    pub code: Option<String>,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Must be between 3 and 32 characters, alphanumeric, and can include underscores or hyphens.
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "crate::models::user::USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    #[validate(email)]
    pub email: String,
    /// Strength rules are checked separately by `validate_password_strength`.
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
}

/// Response after a successful authentication.
/// Contains the JWT access token, the user and the session the token is bound to.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i32,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Returned by login when the password was right but a second factor is needed.
#[derive(Debug, Serialize, Deserialize)]
pub struct TwoFactorChallenge {
    pub requires_two_factor: bool,
    pub challenge_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TwoFactorVerifyRequest {
    #[validate(length(min = 1))]
    pub challenge_token: String,
    #[validate(length(min = 6, max = 16))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TwoFactorCodeRequest {
    #[validate(length(min = 6, max = 16))]
    pub code: String,
}

/// Recovery codes are shown exactly once, when two-factor authentication is enabled.
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TwoFactorDisableRequest {
    /// Required for accounts that have a password.
    pub password: Option<String>,
    #[validate(length(min = 6, max = 16))]
    pub code: String,
}
