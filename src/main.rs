use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;

use doable::auth::AuthMiddleware;
use doable::config::Config;
use doable::routes::{self, health};
use doable::sessions::{MemorySessionStore, RedisSessionStore, SessionStore};
use doable::state::AppState;

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

fn cors(origin: Option<&str>) -> Cors {
    let cors = match origin {
        Some(origin) => Cors::default().allowed_origin(origin).supports_credentials(),
        None => Cors::default().allow_any_origin(),
    };
    cors.allow_any_method().allow_any_header().max_age(3600)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| startup_error("Failed to run migrations", e))?;

    let sessions: Arc<dyn SessionStore> = match config.redis_url.as_deref() {
        Some(url) => {
            let store = RedisSessionStore::connect(url)
                .await
                .map_err(|e| startup_error("Failed to connect to Redis", e))?;
            log::info!("Sessions are stored in Redis");
            Arc::new(store)
        }
        None => {
            log::warn!("REDIS_URL is not set; sessions are kept in memory and lost on restart");
            Arc::new(MemorySessionStore::new())
        }
    };

    let host = config.server_host.clone();
    let port = config.server_port;
    let server_url = config.server_url();
    let state = AppState::new(pool, config, sessions)
        .map_err(|e| startup_error("Failed to initialise application", e))?;
    if let Err(e) = state.exports.resume_unfinished(&state.pool).await {
        log::error!("Could not resume unfinished exports: {}", e);
    }

    log::info!("Starting Doable server at {}", server_url);
    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(cors(data.config.cors_origin.as_deref()))
            .wrap(Logger::default())
            .service(health::health)
            .service(health::ready)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            )
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
