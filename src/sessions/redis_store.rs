use async_trait::async_trait;
use chrono::{Duration, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use uuid::Uuid;

use super::{sort_newest_first, OAuthState, Session, SessionStore, OAUTH_STATE_TTL_SECONDS};
use crate::error::AppError;

/// Redis-backed sessions.
///
/// Layout:
/// - `session:{id}` holds the JSON session with a TTL equal to its remaining lifetime.
/// - `user_sessions:{user_id}` is a set of session ids; stale members are pruned on read.
/// - `oauth_state:{state}` holds a pending OAuth authorization.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection: ConnectionManager,
}

fn session_key(id: Uuid) -> String {
    format!("session:{}", id)
}

fn user_key(user_id: i32) -> String {
    format!("user_sessions:{}", user_id)
}

fn oauth_key(state: &str) -> String {
    format!("oauth_state:{}", state)
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        log::info!("Connected to Redis session store");
        Ok(Self { connection })
    }

    async fn write(&self, session: &Session) -> Result<(), AppError> {
        let ttl = (session.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let json = serde_json::to_string(session)?;
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .set_ex(session_key(session.id), json, ttl)
            .ignore()
            .sadd(user_key(session.user_id), session.id.to_string())
            .ignore()
            .expire(user_key(session.user_id), ttl as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, session: &Session) -> Result<(), AppError> {
        self.write(session).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(session_key(id)).await?;
        let now = Utc::now();
        match raw {
            Some(json) => {
                let session: Session = serde_json::from_str(&json)?;
                Ok(Some(session).filter(|s| !s.is_expired(now)))
            }
            None => Ok(None),
        }
    }

    /// Rewrites the session only while its key still exists (`SET ... XX`), so a
    /// touch racing a logout cannot bring the deleted session back.
    async fn touch(&self, id: Uuid, ttl_seconds: u64) -> Result<Option<Session>, AppError> {
        let Some(mut session) = self.get(id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        session.last_seen_at = now;
        session.expires_at = now + Duration::seconds(ttl_seconds as i64);

        let json = serde_json::to_string(&session)?;
        let mut conn = self.connection.clone();
        let written: Option<String> = redis::cmd("SET")
            .arg(session_key(id))
            .arg(json)
            .arg("XX")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await?;
        if written.is_none() {
            return Ok(None);
        }
        let _: () = redis::pipe()
            .sadd(user_key(session.user_id), id.to_string())
            .ignore()
            .expire(user_key(session.user_id), ttl_seconds.max(1) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(Some(session))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let session = self.get(id).await?;
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(session_key(id)).await?;
        if let Some(session) = session {
            let _: i64 = conn
                .srem(user_key(session.user_id), id.to_string())
                .await?;
        }
        Ok(removed > 0)
    }

    async fn list_for_user(&self, user_id: i32) -> Result<Vec<Session>, AppError> {
        let mut conn = self.connection.clone();
        let ids: Vec<String> = conn.smembers(user_key(user_id)).await?;
        let mut sessions = Vec::with_capacity(ids.len());
        for raw_id in ids {
            let Ok(id) = Uuid::parse_str(&raw_id) else {
                continue;
            };
            match self.get(id).await? {
                Some(session) => sessions.push(session),
                None => {
                    let _: i64 = conn.srem(user_key(user_id), &raw_id).await?;
                }
            }
        }
        sort_newest_first(&mut sessions);
        Ok(sessions)
    }

    async fn delete_all_for_user(
        &self,
        user_id: i32,
        except: Option<Uuid>,
    ) -> Result<usize, AppError> {
        let mut removed = 0;
        for session in self.list_for_user(user_id).await? {
            if Some(session.id) == except {
                continue;
            }
            if self.delete(session.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn put_oauth_state(&self, state: &str, value: &OAuthState) -> Result<(), AppError> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(oauth_key(state), json, OAUTH_STATE_TTL_SECONDS)
            .await?;
        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthState>, AppError> {
        let mut conn = self.connection.clone();
        let (raw, _): (Option<String>, i64) = redis::pipe()
            .atomic()
            .get(oauth_key(state))
            .del(oauth_key(state))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }
}
