//! Intake Server Library
//!
//! Streaming upload validation with content-addressed storage. The binary in
//! main.rs wires this into an axum server; tests build the same router.
//!
//! # Modules
//!
//! - `upload`: Validator, content store, batch coordinator, ingest hand-off
//! - `routes`: HTTP adapter over the pipeline
//! - `auth`: Bearer token middleware for upload routes
//! - `config`: Environment-driven configuration

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod upload;

use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/health", routes::health::router())
        .nest("/api/v1/health", routes::health::router())
        .nest("/api/v1/upload", routes::upload::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
