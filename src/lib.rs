//! File Token Gateway
//!
//! Issues short-lived, unguessable tokens for stored files and serves a file's
//! bytes to whoever presents a valid, unexpired token.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Token Store**: PostgreSQL with sqlx, or in memory for development
//! - **Issuance**: [`services::token_issuer::TokenIssuer`], called by the page renderer
//! - **Serving**: [`services::file_gateway::FileGateway`] behind `GET /getfilesrc/{token}`
//!
//! The issuer and the gateway communicate only through the token store.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;
pub mod store;

use std::any::Any;

use axum::{
    Router,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::error::AppError;
use crate::state::AppState;

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/getfilesrc/{token}", get(handlers::files::get_file_src))
        // A panicking handler still answers with the generic 500
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Request handler panicked");
    AppError::Internal("handler panicked".to_string()).into_response()
}
