//! Server-side session tracking.
//!
//! Every access token references a session. Deleting the session revokes the
//! token immediately, which is how logout, "log out everywhere" and
//! password changes take effect before the JWT itself expires.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub use self::memory::MemorySessionStore;
pub use self::redis_store::RedisSessionStore;

/// How the session was established.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    TwoFactor,
    OAuth,
}

/// An authenticated user context.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub auth_method: AuthMethod,
}

impl Session {
    pub fn new(
        user_id: i32,
        ttl_seconds: u64,
        auth_method: AuthMethod,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            created_at: now,
            last_seen_at: now,
            expires_at: now + Duration::seconds(ttl_seconds as i64),
            ip_address,
            user_agent,
            auth_method,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Pending OAuth authorization, kept between the redirect and the callback.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OAuthState {
    pub provider: String,
    pub pkce_verifier: String,
    pub created_at: DateTime<Utc>,
}

/// OAuth states expire after ten minutes.
pub const OAUTH_STATE_TTL_SECONDS: u64 = 600;

/// Storage for sessions and short-lived OAuth states.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), AppError>;

    /// Returns the session unless it is missing or expired.
    async fn get(&self, id: Uuid) -> Result<Option<Session>, AppError>;

    /// Records activity and pushes the expiry `ttl_seconds` into the future.
    async fn touch(&self, id: Uuid, ttl_seconds: u64) -> Result<Option<Session>, AppError>;

    /// Returns whether a session was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Live sessions for `user_id`, newest first.
    async fn list_for_user(&self, user_id: i32) -> Result<Vec<Session>, AppError>;

    /// Deletes every session of `user_id` except `except`. Returns the number removed.
    async fn delete_all_for_user(&self, user_id: i32, except: Option<Uuid>)
        -> Result<usize, AppError>;

    async fn put_oauth_state(&self, state: &str, value: &OAuthState) -> Result<(), AppError>;

    /// Returns and removes the state; a state can be used only once.
    async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthState>, AppError>;
}

fn sort_newest_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
