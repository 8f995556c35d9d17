use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::lockout::LockoutPolicy;
use crate::auth::token::TokenService;
use crate::config::Config;
use crate::error::AppError;
use crate::events::EventBroadcaster;
use crate::export::ExportWorker;
use crate::oauth::OAuthService;
use crate::sessions::SessionStore;

/// Everything a handler needs besides the request, shared by all workers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub sessions: Arc<dyn SessionStore>,
    pub events: EventBroadcaster,
    pub exports: ExportWorker,
    pub oauth: OAuthService,
    pub lockout: LockoutPolicy,
}

impl AppState {
    /// Wires the services together and starts the export worker.
    pub fn new(
        pool: PgPool,
        config: Config,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, AppError> {
        let events = EventBroadcaster::new();
        let exports = ExportWorker::start(pool.clone(), events.clone());
        Ok(Self {
            tokens: TokenService::new(&config.jwt_secret, config.jwt_expiration_hours),
            lockout: LockoutPolicy::new(config.max_failed_logins, config.lockout_minutes),
            oauth: OAuthService::new(&config)?,
            config: Arc::new(config),
            pool,
            sessions,
            events,
            exports,
        })
    }
}
