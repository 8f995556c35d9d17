use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{sort_newest_first, OAuthState, Session, SessionStore, OAUTH_STATE_TTL_SECONDS};
use crate::error::AppError;

/// Process-local store used when no Redis URL is configured, and in tests.
/// Sessions do not survive a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    oauth_states: RwLock<HashMap<String, (OAuthState, DateTime<Utc>)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included until the next prune.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<(), AppError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .await
            .get(&id)
            .filter(|s| !s.is_expired(now))
            .cloned())
    }

    async fn touch(&self, id: Uuid, ttl_seconds: u64) -> Result<Option<Session>, AppError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(session) if !session.is_expired(now) => {
                session.last_seen_at = now;
                session.expires_at = now + Duration::seconds(ttl_seconds as i64);
                Ok(Some(session.clone()))
            }
            Some(_) => {
                sessions.remove(&id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.sessions.write().await.remove(&id).is_some())
    }

    async fn list_for_user(&self, user_id: i32) -> Result<Vec<Session>, AppError> {
        let now = Utc::now();
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && !s.is_expired(now))
            .cloned()
            .collect();
        sort_newest_first(&mut sessions);
        Ok(sessions)
    }

    async fn delete_all_for_user(
        &self,
        user_id: i32,
        except: Option<Uuid>,
    ) -> Result<usize, AppError> {
        let now = Utc::now();
        let mut removed = 0;
        self.sessions.write().await.retain(|id, s| {
            if s.is_expired(now) {
                return false;
            }
            let revoke = s.user_id == user_id && Some(*id) != except;
            if revoke {
                removed += 1;
            }
            !revoke
        });
        Ok(removed)
    }

    async fn put_oauth_state(&self, state: &str, value: &OAuthState) -> Result<(), AppError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(OAUTH_STATE_TTL_SECONDS as i64);
        let mut states = self.oauth_states.write().await;
        states.retain(|_, (_, expires)| *expires > now);
        states.insert(state.to_string(), (value.clone(), expires_at));
        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthState>, AppError> {
        let now = Utc::now();
        Ok(self
            .oauth_states
            .write()
            .await
            .remove(state)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value))
    }
}
