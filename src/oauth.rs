//! Sign-in with Google and GitHub (authorization code flow with PKCE).
//!
//! The CSRF state and PKCE verifier live in the session store between the
//! redirect and the callback, are single use and expire after ten minutes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, AuthorizationCode, ClientId,
    ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::models::User;
use crate::sessions::{OAuthState, SessionStore};

const USER_AGENT: &str = "Doable/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 2] = [OAuthProvider::Google, OAuthProvider::GitHub];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "google" => Some(OAuthProvider::Google),
            "github" => Some(OAuthProvider::GitHub),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        match self {
            OAuthProvider::Google => (
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
            ),
            OAuthProvider::GitHub => (
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
            ),
        }
    }

    fn scopes(&self) -> &'static [&'static str] {
        match self {
            OAuthProvider::Google => &["openid", "email", "profile"],
            OAuthProvider::GitHub => &["read:user", "user:email"],
        }
    }
}

/// What we learn about the user from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthProfile {
    pub provider_user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub login: Option<String>,
}

impl OAuthProfile {
    /// Seed for the username of a new account.
    pub fn username_hint(&self) -> String {
        self.login
            .clone()
            .or_else(|| self.name.clone())
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "user".to_string())
    }
}

#[derive(Debug)]
pub struct OAuthOutcome {
    pub user: User,
    pub created: bool,
}

#[derive(Clone)]
pub struct OAuthService {
    clients: Arc<HashMap<OAuthProvider, BasicClient>>,
    http: Client,
}

fn redirect_uri(base: &str, provider: OAuthProvider) -> String {
    format!(
        "{}/api/auth/oauth/{}/callback",
        base.trim_end_matches('/'),
        provider.name()
    )
}

impl OAuthService {
    /// Builds clients for the providers that have credentials configured.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let mut clients = HashMap::new();
        for provider in OAuthProvider::ALL {
            let Some(credentials) = config.oauth_provider(provider.name()) else {
                continue;
            };
            let (auth_url, token_url) = provider.endpoints();
            let client = BasicClient::new(
                ClientId::new(credentials.client_id.clone()),
                Some(ClientSecret::new(credentials.client_secret.clone())),
                AuthUrl::new(auth_url.to_string())
                    .map_err(|e| AppError::InternalServerError(format!("Invalid auth URL: {}", e)))?,
                Some(TokenUrl::new(token_url.to_string()).map_err(|e| {
                    AppError::InternalServerError(format!("Invalid token URL: {}", e))
                })?),
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri(&config.oauth_redirect_base, provider)).map_err(
                    |e| AppError::InternalServerError(format!("Invalid redirect URL: {}", e)),
                )?,
            );
            clients.insert(provider, client);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::InternalServerError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            clients: Arc::new(clients),
            http,
        })
    }

    pub fn enabled_providers(&self) -> Vec<&'static str> {
        OAuthProvider::ALL
            .iter()
            .filter(|p| self.clients.contains_key(p))
            .map(|p| p.name())
            .collect()
    }

    fn client(&self, provider: OAuthProvider) -> Result<&BasicClient, AppError> {
        self.clients.get(&provider).ok_or_else(|| {
            AppError::NotFound(format!("OAuth provider {} is not enabled", provider.name()))
        })
    }

    /// Returns the provider URL to redirect the browser to.
    pub async fn authorize_url(
        &self,
        provider: OAuthProvider,
        sessions: &dyn SessionStore,
    ) -> Result<String, AppError> {
        let client = self.client(provider)?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(challenge);
        for scope in provider.scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, state) = request.url();

        sessions
            .put_oauth_state(
                state.secret(),
                &OAuthState {
                    provider: provider.name().to_string(),
                    pkce_verifier: verifier.secret().clone(),
                    created_at: Utc::now(),
                },
            )
            .await?;
        Ok(url.to_string())
    }

    /// Handles the callback: validates state, exchanges the code and resolves the
    /// local user, creating or linking one when needed.
    pub async fn complete(
        &self,
        pool: &PgPool,
        sessions: &dyn SessionStore,
        provider: OAuthProvider,
        code: &str,
        state: &str,
    ) -> Result<OAuthOutcome, AppError> {
        let stored = sessions
            .take_oauth_state(state)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired OAuth state".into()))?;
        if stored.provider != provider.name() {
            return Err(AppError::Unauthorized("OAuth state does not match provider".into()));
        }

        let token = self
            .client(provider)?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(stored.pkce_verifier))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                log::warn!("OAuth code exchange with {} failed: {}", provider.name(), e);
                AppError::Unauthorized("OAuth code exchange failed".into())
            })?;

        let profile = self
            .fetch_profile(provider, token.access_token().secret())
            .await?;
        resolve_user(pool, provider, &profile).await
    }

    async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> Result<OAuthProfile, AppError> {
        match provider {
            OAuthProvider::Google => {
                #[derive(Deserialize)]
                struct GoogleUser {
                    sub: String,
                    email: Option<String>,
                    #[serde(default)]
                    email_verified: bool,
                    name: Option<String>,
                }

                let user: GoogleUser = self
                    .get_json("https://openidconnect.googleapis.com/v1/userinfo", access_token)
                    .await?;
                Ok(OAuthProfile {
                    provider_user_id: user.sub,
                    email: user.email,
                    email_verified: user.email_verified,
                    name: user.name,
                    login: None,
                })
            }
            OAuthProvider::GitHub => {
                #[derive(Deserialize)]
                struct GitHubUser {
                    id: i64,
                    login: String,
                    name: Option<String>,
                }

                #[derive(Deserialize)]
                struct GitHubEmail {
                    email: String,
                    primary: bool,
                    verified: bool,
                }

                let user: GitHubUser = self
                    .get_json("https://api.github.com/user", access_token)
                    .await?;
                // The profile email may be hidden; the emails endpoint says whether it is verified.
                let emails: Vec<GitHubEmail> = self
                    .get_json("https://api.github.com/user/emails", access_token)
                    .await
                    .unwrap_or_default();
                let primary = emails.into_iter().find(|e| e.primary);

                Ok(OAuthProfile {
                    provider_user_id: user.id.to_string(),
                    email_verified: primary.as_ref().map(|e| e.verified).unwrap_or(false),
                    email: primary.map(|e| e.email),
                    name: user.name,
                    login: Some(user.login),
                })
            }
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::InternalServerError(format!("Failed to get user info: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Unauthorized(format!(
                "Provider rejected the access token ({})",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::InternalServerError(format!("Failed to parse user info: {}", e)))
    }
}

/// Linked account first, then a verified email match, otherwise a new user.
pub async fn resolve_user(
    pool: &PgPool,
    provider: OAuthProvider,
    profile: &OAuthProfile,
) -> Result<OAuthOutcome, AppError> {
    let linked: Option<i32> = sqlx::query_scalar(
        "SELECT user_id FROM oauth_accounts WHERE provider = $1 AND provider_user_id = $2",
    )
    .bind(provider.name())
    .bind(&profile.provider_user_id)
    .fetch_optional(pool)
    .await?;

    if let Some(user_id) = linked {
        let user = db::users::find_by_id(pool, user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Account is no longer active".into()))?;
        return Ok(OAuthOutcome {
            user,
            created: false,
        });
    }

    let verified_email = profile
        .email
        .as_deref()
        .filter(|_| profile.email_verified);

    if let Some(email) = verified_email {
        if let Some(user) = db::users::find_by_email(pool, email).await? {
            link(pool, user.id, provider, profile).await?;
            log::info!("Linked {} account to user {}", provider.name(), user.id);
            return Ok(OAuthOutcome {
                user,
                created: false,
            });
        }
    }

    let email = match verified_email {
        Some(email) if !db::users::email_taken(pool, email).await? => email.to_string(),
        // Unverified or unavailable email: a placeholder keeps the column unique.
        _ => format!(
            "{}+{}@users.noreply.doable",
            provider.name(),
            profile.provider_user_id
        ),
    };
    let username = db::users::unique_username(pool, &profile.username_hint()).await?;

    let mut tx = pool.begin().await?;
    let user = db::users::create(
        &mut *tx,
        &username,
        &email,
        None,
        profile.name.as_deref(),
    )
    .await?;
    link(&mut *tx, user.id, provider, profile).await?;
    tx.commit().await?;

    log::info!("Created user {} from {} sign-in", user.id, provider.name());
    Ok(OAuthOutcome {
        user,
        created: true,
    })
}

async fn link<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    user_id: i32,
    provider: OAuthProvider,
    profile: &OAuthProfile,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO oauth_accounts (id, user_id, provider, provider_user_id, email) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(provider.name())
    .bind(&profile.provider_user_id)
    .bind(&profile.email)
    .execute(executor)
    .await?;
    Ok(())
}
