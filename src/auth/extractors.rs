use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use serde::Serialize;
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;

/// How the caller proved who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// A JWT bound to a live session.
    Session,
    /// A personal API key.
    ApiKey,
}

/// The authenticated caller, inserted into request extensions by `AuthMiddleware`.
///
/// If it is missing (e.g. `AuthMiddleware` did not run for this route) extraction
/// fails with `AppError::Unauthorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i32,
    /// `None` for API key requests.
    pub session_id: Option<Uuid>,
    /// Set only for API key requests.
    pub api_key_id: Option<Uuid>,
    pub method: CredentialKind,
}

impl AuthenticatedUser {
    /// The current session, for operations that make no sense with an API key.
    pub fn require_session(&self) -> Result<Uuid, AppError> {
        self.session_id
            .ok_or_else(|| AppError::Forbidden("This operation requires a login session".into()))
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>().copied() {
            Some(user) => ready(Ok(user)),
            None => {
                let err = AppError::Unauthorized("Authentication required".to_string());
                ready(Err(err.into()))
            }
        }
    }
}

/// Client address and user agent, recorded with sessions and audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_http_request(req: &HttpRequest) -> Self {
        let ip_address = req
            .connection_info()
            .realip_remote_addr()
            .map(|addr| addr.to_string());
        let user_agent = req
            .headers()
            .get(actix_web::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.chars().take(512).collect());
        Self {
            ip_address,
            user_agent,
        }
    }
}

impl FromRequest for ClientInfo {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(ClientInfo::from_http_request(req)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::dev::Payload;
    use actix_web::http::StatusCode;
    use actix_web::test;

    #[actix_rt::test]
    async fn test_authenticated_user_extractor_success() {
        let req = test::TestRequest::default().to_http_request();
        let session_id = Uuid::new_v4();
        req.extensions_mut().insert(AuthenticatedUser {
            user_id: 123,
            session_id: Some(session_id),
            api_key_id: None,
            method: CredentialKind::Session,
        });

        let mut payload = Payload::None;
        let user = AuthenticatedUser::from_request(&req, &mut payload)
            .await
            .unwrap();
        assert_eq!(user.user_id, 123);
        assert_eq!(user.require_session().unwrap(), session_id);
    }

    #[actix_rt::test]
    async fn test_authenticated_user_extractor_failure() {
        let req = test::TestRequest::default().to_http_request();

        let mut payload = Payload::None;
        let result = AuthenticatedUser::from_request(&req, &mut payload).await;
        assert!(result.is_err());

        let response = result.unwrap_err().error_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[core::prelude::v1::test]
    fn test_api_key_callers_have_no_session() {
        let user = AuthenticatedUser {
            user_id: 1,
            session_id: None,
            api_key_id: Some(Uuid::new_v4()),
            method: CredentialKind::ApiKey,
        };
        assert!(user.require_session().is_err());
    }

    #[actix_rt::test]
    async fn test_client_info() {
        let req = test::TestRequest::default()
            .insert_header(("User-Agent", "curl/8.0"))
            .peer_addr("10.1.2.3:4567".parse().unwrap())
            .to_http_request();
        let info = ClientInfo::from_http_request(&req);
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));
        assert!(info.ip_address.unwrap().starts_with("10.1.2.3"));
    }
}
