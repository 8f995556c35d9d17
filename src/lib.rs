#![doc = "The `doable` library crate."]
#![doc = ""]
#![doc = "This crate contains the domain models, persistence, authentication (sessions,"]
#![doc = "two-factor, OAuth and API keys), background exports, productivity tools and"]
#![doc = "routing configuration of the Doable service. It is used by the main binary"]
#![doc = "(`main.rs`) and by the integration tests to construct the application."]

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod export;
pub mod models;
pub mod oauth;
pub mod productivity;
pub mod routes;
pub mod sessions;
pub mod state;

pub use crate::error::AppError;
pub use crate::state::AppState;
