use super::handlers;
use crate::server::state::AppState;
use axum::{
    routing::{delete, get},
    Router,
};

/// Introspection routes (mounted under `/api`, session required)
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/catalog", get(handlers::catalog))
        .route("/repos", get(handlers::repos))
        .route("/tags", get(handlers::tags))
        .route("/taginfo", get(handlers::tag_info))
        .route("/taglayers", get(handlers::tag_layers))
        .route("/tag", delete(handlers::delete_tag))
}
