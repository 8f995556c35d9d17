use std::rc::Rc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use super::api_key;
use super::extractors::{AuthenticatedUser, CredentialKind};
use super::token::TokenPurpose;
use crate::db;
use crate::error::AppError;
use crate::state::AppState;

/// Paths under `/api` reachable without credentials.
const PUBLIC_PATHS: [&str; 3] = ["/api/auth/login", "/api/auth/register", "/api/auth/2fa/verify"];
const PUBLIC_PREFIXES: [&str; 1] = ["/api/auth/oauth/"];
/// `EventSource` cannot send headers, so this endpoint also accepts `?access_token=`.
const QUERY_TOKEN_PATH: &str = "/api/events";

pub fn is_public(path: &str) -> bool {
    path == "/health"
        || path.starts_with("/health/")
        || PUBLIC_PATHS.contains(&path)
        || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.trim().to_string());
    if header.is_some() || req.path() != QUERY_TOKEN_PATH {
        return header;
    }
    url::form_urlencoded::parse(req.query_string().as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
}

/// Resolves a bearer credential: an API key, or an access JWT whose session is
/// still alive. A successful lookup refreshes the session TTL.
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthenticatedUser, AppError> {
    if api_key::looks_like_key(token) {
        let (key_id, user_id) = db::api_keys::resolve(&state.pool, &api_key::hash(token))
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid API key".into()))?;
        return Ok(AuthenticatedUser {
            user_id,
            session_id: None,
            api_key_id: Some(key_id),
            method: CredentialKind::ApiKey,
        });
    }

    let claims = state.tokens.verify(token, TokenPurpose::Access)?;
    let session_id = claims
        .sid
        .ok_or_else(|| AppError::Unauthorized("Invalid token: missing session".into()))?;
    let session = state
        .sessions
        .touch(session_id, state.config.session_ttl_seconds)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Session expired or revoked".into()))?;
    if session.user_id != claims.sub {
        return Err(AppError::Unauthorized("Session does not belong to token".into()));
    }

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        session_id: Some(session_id),
        api_key_id: None,
        method: CredentialKind::Session,
    })
}

pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            if is_public(req.path()) {
                return service.call(req).await;
            }

            let state = req
                .app_data::<web::Data<AppState>>()
                .cloned()
                .ok_or_else(|| AppError::InternalServerError("Application state missing".into()))?;
            let token = bearer_token(&req)
                .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

            let user = authenticate(&state, &token).await.map_err(|e| {
                log::debug!("Rejected request to {}: {}", req.path(), e);
                e
            })?;
            req.extensions_mut().insert(user);
            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_public_paths() {
        assert!(is_public("/health"));
        assert!(is_public("/health/ready"));
        assert!(is_public("/api/auth/login"));
        assert!(is_public("/api/auth/2fa/verify"));
        assert!(is_public("/api/auth/oauth/github/callback"));
        assert!(!is_public("/api/auth/logout"));
        assert!(!is_public("/api/auth/2fa/setup"));
        assert!(!is_public("/api/todos"));
        assert!(!is_public("/api/auth/login-history"));
    }

    #[test]
    fn test_bearer_token_from_header() {
        let req = TestRequest::get()
            .uri("/api/todos")
            .insert_header(("Authorization", "Bearer abc.def"))
            .to_srv_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_query_token_only_for_event_stream() {
        let events = TestRequest::get()
            .uri("/api/events?access_token=abc")
            .to_srv_request();
        assert_eq!(bearer_token(&events).as_deref(), Some("abc"));

        let todos = TestRequest::get()
            .uri("/api/todos?access_token=abc")
            .to_srv_request();
        assert!(bearer_token(&todos).is_none());
    }
}
