use std::env;
use std::str::FromStr;

use crate::error::AppError;

/// Client credentials for one OAuth provider.
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Runtime configuration, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    pub server_host: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub redis_url: Option<String>,
    pub session_ttl_seconds: u64,
    pub max_failed_logins: i32,
    pub lockout_minutes: i64,
    pub totp_issuer: String,
    pub cors_origin: Option<String>,
    /// Interval of SSE keepalive comments; credentials are re-checked on each one.
    pub sse_keepalive_seconds: u64,
    pub oauth_redirect_base: String,
    pub google: Option<OAuthProviderConfig>,
    pub github: Option<OAuthProviderConfig>,
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::InternalServerError(format!("{} must be set", name)))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::InternalServerError(format!("{} has an invalid value", name))),
        None => Ok(default),
    }
}

fn provider(prefix: &str) -> Option<OAuthProviderConfig> {
    let client_id = optional(&format!("{}_CLIENT_ID", prefix))?;
    let client_secret = optional(&format!("{}_CLIENT_SECRET", prefix))?;
    Some(OAuthProviderConfig {
        client_id,
        client_secret,
    })
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            server_port: parsed("SERVER_PORT", 8080)?,
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_hours: parsed("JWT_EXPIRATION_HOURS", 24)?,
            redis_url: optional("REDIS_URL"),
            session_ttl_seconds: parsed("SESSION_TTL_SECONDS", 60 * 60 * 24 * 7)?,
            max_failed_logins: parsed("MAX_FAILED_LOGINS", 5)?,
            lockout_minutes: parsed("LOCKOUT_MINUTES", 15)?,
            totp_issuer: optional("TOTP_ISSUER").unwrap_or_else(|| "Doable".to_string()),
            cors_origin: optional("CORS_ORIGIN"),
            sse_keepalive_seconds: parsed("SSE_KEEPALIVE_SECONDS", 15)?,
            oauth_redirect_base: optional("OAUTH_REDIRECT_BASE")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            google: provider("GOOGLE"),
            github: provider("GITHUB"),
        })
    }

    /// A configuration suitable for tests: in-memory sessions, no OAuth providers.
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            server_port: 8080,
            server_host: "127.0.0.1".to_string(),
            jwt_secret: "test-secret-do-not-use".to_string(),
            jwt_expiration_hours: 1,
            redis_url: None,
            session_ttl_seconds: 3600,
            max_failed_logins: 5,
            lockout_minutes: 15,
            totp_issuer: "Doable".to_string(),
            cors_origin: None,
            sse_keepalive_seconds: 15,
            oauth_redirect_base: "http://localhost:8080".to_string(),
            google: None,
            github: None,
        }
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }

    pub fn oauth_provider(&self, name: &str) -> Option<&OAuthProviderConfig> {
        match name {
            "google" => self.google.as_ref(),
            "github" => self.github.as_ref(),
            _ => None,
        }
    }
}
