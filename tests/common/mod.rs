#![allow(dead_code)]

use std::sync::Arc;

use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::test;
use dotenv::dotenv;
use serde_json::{json, Value};
use sqlx::PgPool;

use doable::config::Config;
use doable::sessions::{MemorySessionStore, SessionStore};
use doable::state::AppState;

pub const PASSWORD: &str = "Password123";

/// State backed by the database in `DATABASE_URL`, with migrations applied.
pub async fn db_state() -> AppState {
    dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    AppState::new(pool, Config::for_tests(&database_url), sessions).expect("state")
}

/// A short random suffix so tests can run against a shared database.
pub fn unique(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &id[..8])
}

macro_rules! init_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state.clone()))
                .wrap(actix_web::middleware::Logger::default())
                .service(doable::routes::health::health)
                .service(doable::routes::health::ready)
                .service(
                    actix_web::web::scope("/api")
                        .wrap(doable::auth::AuthMiddleware)
                        .configure(doable::routes::config),
                ),
        )
        .await
    };
}

/// Sends a request and returns status and JSON body (`Null` when empty or not JSON).
/// Errors raised by middleware are turned into their response status.
pub async fn send(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
    >,
    req: actix_http::Request,
) -> (StatusCode, Value) {
    match test::try_call_service(app, req).await {
        Ok(resp) => {
            let status = resp.status();
            let body = test::read_body(resp).await;
            (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
        }
        Err(err) => (err.as_response_error().status_code(), Value::Null),
    }
}

/// Registers a fresh user and returns `(email, token)`.
pub async fn register_user(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
    >,
    prefix: &str,
) -> (String, String) {
    let username = unique(prefix);
    let email = format!("{}@example.com", username);
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": username,
            "email": email,
            "password": PASSWORD
        }))
        .to_request();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Registration failed: {}", body);
    let token = body["token"].as_str().expect("token").to_string();
    (email, token)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
