use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifetime of the token handed out between the password step and the 2FA step.
const CHALLENGE_MINUTES: i64 = 5;

/// What a token may be used for.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Regular API access, bound to a session.
    Access,
    /// Proof that the password step of a 2FA login succeeded.
    TwoFactor,
}

/// Represents the claims encoded within a JWT (JSON Web Token).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject of the token, the user's unique identifier.
    pub sub: i32,
    /// Session the token belongs to. Challenge tokens carry no session.
    pub sid: Option<Uuid>,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: usize,
    pub purpose: TokenPurpose,
}

/// Signs and verifies JWTs with the configured HMAC secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::hours(access_ttl_hours),
        }
    }

    fn issue(
        &self,
        user_id: i32,
        session_id: Option<Uuid>,
        ttl: Duration,
        purpose: TokenPurpose,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            sid: session_id,
            exp: (now + ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
            purpose,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
    }

    /// Issues an access token for `user_id` bound to `session_id`.
    pub fn issue_access(&self, user_id: i32, session_id: Uuid) -> Result<String, AppError> {
        self.issue(
            user_id,
            Some(session_id),
            self.access_ttl,
            TokenPurpose::Access,
        )
    }

    /// Issues a short-lived token that can only be exchanged at `/auth/2fa/verify`.
    pub fn issue_challenge(&self, user_id: i32) -> Result<String, AppError> {
        self.issue(
            user_id,
            None,
            Duration::minutes(CHALLENGE_MINUTES),
            TokenPurpose::TwoFactor,
        )
    }

    /// Verifies signature and expiry and checks that the token was issued for `expected`.
    pub fn verify(&self, token: &str, expected: TokenPurpose) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)?;
        if claims.purpose != expected {
            return Err(AppError::Unauthorized("Invalid token: wrong purpose".into()));
        }
        if expected == TokenPurpose::Access && claims.sid.is_none() {
            return Err(AppError::Unauthorized("Invalid token: missing session".into()));
        }
        Ok(claims)
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }
}
