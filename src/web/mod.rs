// Axum start-up code. The UI is a single page served from templates/ and
// static/; everything it does goes through the JSON API in handlers::api.

pub mod handlers;
pub mod routes;
pub mod state;
pub mod static_files;
pub mod templates;

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WebConfig;
use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_limit_bytes = state.config.web.upload_limit_mb * 1024 * 1024;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::ui_routes())
        .merge(routes::api_routes(upload_limit_bytes))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(
    config: WebConfig,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = build_router(Arc::clone(&state));

    info!("Listening on http://{}", addr);
    info!("Upload limit: {} MB", config.upload_limit_mb);

    let session_config = &state.config.session;
    if session_config.idle_timeout_secs > 0 {
        let idle = Duration::from_secs(session_config.idle_timeout_secs);
        let interval_secs = session_config.cleanup_interval_secs.max(1);
        tokio::spawn(cleanup_idle_sessions(Arc::clone(&state), idle, interval_secs));
        info!(
            "Session cleanup task started (idle timeout: {}s, interval: {}s)",
            session_config.idle_timeout_secs, interval_secs
        );
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Background task that drops idle sessions and their uploaded databases
async fn cleanup_idle_sessions(state: Arc<AppState>, idle: Duration, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs));

    loop {
        ticker.tick().await;

        let expired = state.sessions.expire_idle(idle, Instant::now()).await;
        if expired > 0 {
            info!("Cleaned up {} idle session(s)", expired);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
