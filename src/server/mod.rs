pub mod auth;
pub mod error;
pub mod middleware;
pub mod proxy;
pub mod registry;
pub mod settings;
pub mod state;
#[cfg(test)]
pub(crate) mod test_support;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use state::AppState;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Assemble the full application router
pub fn build_router(state: AppState) -> Router {
    // Public routes (no session)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version_info))
        .merge(auth::routes::public_routes());

    // Introspection API (requires a browser session)
    let api_routes = Router::new()
        .merge(auth::routes::protected_routes())
        .merge(registry::routes::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::session_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/api", api_routes)
        .merge(proxy::routes::routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(middleware::make_request_span)),
        )
}

/// Run the HTTP server until SIGINT/SIGTERM
pub async fn run_server(settings: settings::Settings) -> Result<()> {
    let state = AppState::new(&settings)?;
    let app = build_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on http://{}", addr);

    // Peer addresses feed X-Forwarded-For on proxied requests
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn version_info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "repository": env!("CARGO_PKG_REPOSITORY"),
    }))
}

/// Wait for a shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
