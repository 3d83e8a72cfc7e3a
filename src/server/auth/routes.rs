use super::handlers;
use crate::server::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Public routes that don't require a session
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(handlers::login))
        .route("/logout", get(handlers::logout).post(handlers::logout))
}

/// Routes that require a session (mounted under `/api`)
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(handlers::dashboard))
}
