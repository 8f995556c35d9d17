use actix_web::{get, http::header, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    audit::{self, AuditEntry},
    auth::{
        hash_password, totp, validate_password_strength, verify_password, AuthResponse,
        AuthenticatedUser, BackupCodesResponse, ClientInfo, LoginRequest, RegisterRequest,
        TokenPurpose, TwoFactorChallenge, TwoFactorCodeRequest, TwoFactorDisableRequest,
        TwoFactorSetupResponse, TwoFactorVerifyRequest,
    },
    db,
    error::AppError,
    models::User,
    oauth::OAuthProvider,
    sessions::{AuthMethod, Session},
    state::AppState,
};

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

/// Creates a session for `user_id` and issues an access token bound to it.
pub(crate) async fn start_session(
    state: &AppState,
    user_id: i32,
    method: AuthMethod,
    client: &ClientInfo,
) -> Result<AuthResponse, AppError> {
    let session = Session::new(
        user_id,
        state.config.session_ttl_seconds,
        method,
        client.ip_address.clone(),
        client.user_agent.clone(),
    );
    state.sessions.create(&session).await?;
    let token = state.tokens.issue_access(user_id, session.id)?;
    db::users::record_successful_login(&state.pool, user_id).await?;

    Ok(AuthResponse {
        token,
        user_id,
        session_id: session.id,
        expires_at: Utc::now() + state.tokens.access_ttl(),
    })
}

/// Counts a failed attempt and locks the account when the limit is reached.
async fn register_failure(
    state: &AppState,
    user: &User,
    client: &ClientInfo,
) -> Result<(), AppError> {
    let outcome = db::users::record_failed_login(&state.pool, user.id, &state.lockout).await?;

    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.id), audit::USER_LOGIN_FAILED)
            .client(client.ip_address.clone(), client.user_agent.clone()),
    )
    .await;

    if let Some(until) = outcome.locked_until {
        log::warn!("Locking user {} until {}", user.id, until);
        audit::record(
            &state.pool,
            AuditEntry::new(Some(user.id), audit::USER_LOCKED)
                .metadata(json!({ "locked_until": until }))
                .client(client.ip_address.clone(), client.user_agent.clone()),
        )
        .await;
    }
    Ok(())
}

/// Accepts a current TOTP code, or consumes one of the user's backup codes.
async fn check_second_factor(state: &AppState, user: &User, code: &str) -> Result<(), AppError> {
    let secret = user
        .two_factor_secret
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("Two-factor authentication is not set up".into()))?;
    if totp::verify_now(secret, code) {
        return Ok(());
    }
    let hashed = totp::hash_backup_code(code);
    if let Some(remaining) = db::users::consume_backup_code(&state.pool, user.id, &hashed).await? {
        log::info!("User {} used a backup code, {} left", user.id, remaining);
        return Ok(());
    }
    Err(AppError::Unauthorized("Invalid two-factor code".into()))
}

fn ensure_not_locked(state: &AppState, user: &User, now: DateTime<Utc>) -> Result<(), AppError> {
    if state.lockout.is_locked(user.locked_until, now) {
        return Err(AppError::Locked(
            "Account is temporarily locked after too many failed logins".into(),
        ));
    }
    Ok(())
}

/// Register a new user
///
/// Creates a new user account, opens a session and returns an access token.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    client: ClientInfo,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    validate_password_strength(&register_data.password)?;

    if db::users::email_taken(&state.pool, &register_data.email).await? {
        return Err(AppError::Conflict("Email already registered".into()));
    }
    if db::users::username_taken(&state.pool, &register_data.username).await? {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let password_hash = hash_password(&register_data.password)?;
    let user = db::users::create(
        &state.pool,
        &register_data.username,
        &register_data.email,
        Some(&password_hash),
        register_data.display_name.as_deref(),
    )
    .await?;
    log::info!("Registered user {}", user.id);

    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.id), audit::USER_REGISTER)
            .client(client.ip_address.clone(), client.user_agent.clone()),
    )
    .await;

    let response = start_session(&state, user.id, AuthMethod::Password, &client).await?;
    Ok(HttpResponse::Created().json(response))
}

/// Login user
///
/// Authenticates with email and password. Accounts with two-factor authentication
/// either pass `code` directly or receive a challenge token for `/2fa/verify`.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    client: ClientInfo,
    login_data: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    login_data.validate()?;
    let now = Utc::now();

    let Some(user) = db::users::find_by_email(&state.pool, &login_data.email).await? else {
        audit::record(
            &state.pool,
            AuditEntry::new(None, audit::USER_LOGIN_FAILED)
                .metadata(json!({ "email": login_data.email }))
                .client(client.ip_address.clone(), client.user_agent.clone()),
        )
        .await;
        return Err(invalid_credentials());
    };

    ensure_not_locked(&state, &user, now)?;

    // OAuth-only accounts have no password to check.
    let Some(password_hash) = user.password_hash.as_deref() else {
        return Err(invalid_credentials());
    };
    if !verify_password(&login_data.password, password_hash)? {
        register_failure(&state, &user, &client).await?;
        return Err(invalid_credentials());
    }

    let mut method = AuthMethod::Password;
    if user.two_factor_enabled {
        let code = login_data
            .code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());
        match code {
            None => {
                let challenge_token = state.tokens.issue_challenge(user.id)?;
                return Ok(HttpResponse::Ok().json(TwoFactorChallenge {
                    requires_two_factor: true,
                    challenge_token,
                }));
            }
            Some(code) => {
                if let Err(e) = check_second_factor(&state, &user, code).await {
                    register_failure(&state, &user, &client).await?;
                    return Err(e);
                }
                method = AuthMethod::TwoFactor;
            }
        }
    }

    let response = start_session(&state, user.id, method, &client).await?;
    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.id), audit::USER_LOGIN)
            .resource("session", response.session_id)
            .client(client.ip_address.clone(), client.user_agent.clone()),
    )
    .await;
    Ok(HttpResponse::Ok().json(response))
}

/// Second step of a two-factor login: exchanges a challenge token and a code for
/// an access token.
#[post("/2fa/verify")]
pub async fn verify_two_factor(
    state: web::Data<AppState>,
    client: ClientInfo,
    body: web::Json<TwoFactorVerifyRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let now = Utc::now();

    let claims = state
        .tokens
        .verify(&body.challenge_token, TokenPurpose::TwoFactor)?;
    let user = db::users::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or_else(invalid_credentials)?;
    ensure_not_locked(&state, &user, now)?;

    if let Err(e) = check_second_factor(&state, &user, body.code.trim()).await {
        register_failure(&state, &user, &client).await?;
        return Err(e);
    }

    let response = start_session(&state, user.id, AuthMethod::TwoFactor, &client).await?;
    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.id), audit::USER_LOGIN)
            .resource("session", response.session_id)
            .metadata(json!({ "method": "two_factor" }))
            .client(client.ip_address.clone(), client.user_agent.clone()),
    )
    .await;
    Ok(HttpResponse::Ok().json(response))
}

/// Ends the current session.
#[post("/logout")]
pub async fn logout(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> Result<impl Responder, AppError> {
    let session_id = user.require_session()?;
    state.sessions.delete(session_id).await?;
    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.user_id), audit::USER_LOGOUT)
            .resource("session", session_id)
            .client(client.ip_address, client.user_agent),
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}

/// Ends every session of the user, the current one included.
#[post("/logout-all")]
pub async fn logout_all(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> Result<impl Responder, AppError> {
    user.require_session()?;
    let revoked = state
        .sessions
        .delete_all_for_user(user.user_id, None)
        .await?;
    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.user_id), audit::USER_LOGOUT)
            .metadata(json!({ "all_sessions": true, "revoked": revoked }))
            .client(client.ip_address, client.user_agent),
    )
    .await;
    Ok(HttpResponse::Ok().json(json!({ "revoked": revoked })))
}

/// Generates a new TOTP secret. It becomes active only after `/2fa/enable`.
#[post("/2fa/setup")]
pub async fn two_factor_setup(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    user.require_session()?;
    let account = db::users::get(&state.pool, user.user_id).await?;
    if account.two_factor_enabled {
        return Err(AppError::Conflict(
            "Two-factor authentication is already enabled".into(),
        ));
    }

    let secret = totp::generate_secret();
    db::users::set_two_factor(&state.pool, account.id, Some(&secret), false, &[]).await?;

    Ok(HttpResponse::Ok().json(TwoFactorSetupResponse {
        otpauth_url: totp::otpauth_url(&state.config.totp_issuer, &account.email, &secret),
        secret,
    }))
}

/// Confirms the pending secret with a code and returns fresh backup codes.
#[post("/2fa/enable")]
pub async fn two_factor_enable(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    body: web::Json<TwoFactorCodeRequest>,
) -> Result<impl Responder, AppError> {
    user.require_session()?;
    body.validate()?;
    let account = db::users::get(&state.pool, user.user_id).await?;
    if account.two_factor_enabled {
        return Err(AppError::Conflict(
            "Two-factor authentication is already enabled".into(),
        ));
    }
    let secret = account
        .two_factor_secret
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Call /auth/2fa/setup first".into()))?;
    if !totp::verify_now(secret, body.code.trim()) {
        return Err(AppError::BadRequest("Invalid two-factor code".into()));
    }

    let backup_codes = totp::generate_backup_codes();
    let hashed: Vec<String> = backup_codes
        .iter()
        .map(|code| totp::hash_backup_code(code))
        .collect();
    db::users::set_two_factor(&state.pool, account.id, Some(secret), true, &hashed).await?;

    audit::record(
        &state.pool,
        AuditEntry::new(Some(account.id), audit::TWO_FACTOR_ENABLED)
            .client(client.ip_address, client.user_agent),
    )
    .await;
    Ok(HttpResponse::Ok().json(BackupCodesResponse { backup_codes }))
}

#[post("/2fa/disable")]
pub async fn two_factor_disable(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    body: web::Json<TwoFactorDisableRequest>,
) -> Result<impl Responder, AppError> {
    user.require_session()?;
    body.validate()?;
    let account = db::users::get(&state.pool, user.user_id).await?;
    if !account.two_factor_enabled {
        return Err(AppError::BadRequest(
            "Two-factor authentication is not enabled".into(),
        ));
    }
    if let Some(password_hash) = account.password_hash.as_deref() {
        let password = body.password.as_deref().unwrap_or_default();
        if !verify_password(password, password_hash)? {
            return Err(AppError::Unauthorized("Password is incorrect".into()));
        }
    }
    check_second_factor(&state, &account, body.code.trim()).await?;

    db::users::set_two_factor(&state.pool, account.id, None, false, &[]).await?;
    audit::record(
        &state.pool,
        AuditEntry::new(Some(account.id), audit::TWO_FACTOR_DISABLED)
            .client(client.ip_address, client.user_agent),
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/oauth/providers")]
pub async fn oauth_providers(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({ "providers": state.oauth.enabled_providers() }))
}

fn parse_provider(name: &str) -> Result<OAuthProvider, AppError> {
    OAuthProvider::from_name(name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown OAuth provider {}", name)))
}

/// Redirects the browser to the provider's consent page.
#[get("/oauth/{provider}")]
pub async fn oauth_start(
    state: web::Data<AppState>,
    provider: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let provider = parse_provider(&provider)?;
    let url = state
        .oauth
        .authorize_url(provider, state.sessions.as_ref())
        .await?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, url))
        .finish())
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[get("/oauth/{provider}/callback")]
pub async fn oauth_callback(
    state: web::Data<AppState>,
    provider: web::Path<String>,
    query: web::Query<OAuthCallbackQuery>,
    client: ClientInfo,
) -> Result<impl Responder, AppError> {
    let provider = parse_provider(&provider)?;
    if let Some(error) = &query.error {
        return Err(AppError::Unauthorized(format!("OAuth sign-in failed: {}", error)));
    }
    let (Some(code), Some(oauth_state)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Err(AppError::BadRequest("Missing code or state".into()));
    };

    let outcome = state
        .oauth
        .complete(
            &state.pool,
            state.sessions.as_ref(),
            provider,
            code,
            oauth_state,
        )
        .await?;

    if outcome.created {
        audit::record(
            &state.pool,
            AuditEntry::new(Some(outcome.user.id), audit::USER_REGISTER)
                .metadata(json!({ "provider": provider.name() }))
                .client(client.ip_address.clone(), client.user_agent.clone()),
        )
        .await;
    }

    let response = start_session(&state, outcome.user.id, AuthMethod::OAuth, &client).await?;
    audit::record(
        &state.pool,
        AuditEntry::new(Some(outcome.user.id), audit::OAUTH_LOGIN)
            .resource("session", response.session_id)
            .metadata(json!({ "provider": provider.name() }))
            .client(client.ip_address, client.user_agent),
    )
    .await;
    Ok(HttpResponse::Ok().json(response))
}
