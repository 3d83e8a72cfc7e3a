use axum::{routing::any, Router};

use super::handlers;
use crate::server::state::AppState;

/// Registry protocol routes, any method
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v2", any(handlers::proxy))
        .route("/v2/", any(handlers::proxy))
        .route("/v2/{*rest}", any(handlers::proxy))
}
