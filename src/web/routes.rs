use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::static_files::static_handler;
use super::state::AppState;

// UI Routes - web interface
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::ui::index_handler))
        .route("/static/{*path}", get(static_handler))
}

// API Routes - REST API for programmatic access
pub fn api_routes(upload_limit_bytes: usize) -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Sessions
            .route("/sessions", post(handlers::api::create_session))
            .route(
                "/sessions/{id}",
                get(handlers::api::get_session).delete(handlers::api::delete_session),
            )
            // Database upload
            .route(
                "/sessions/{id}/database",
                post(handlers::api::upload_database)
                    .layer(DefaultBodyLimit::max(upload_limit_bytes)),
            )
            // Questions and their results
            .route("/sessions/{id}/ask", post(handlers::api::ask))
            .route("/sessions/{id}/queries", get(handlers::api::list_session_queries))
            .route("/sessions/{id}/export/{format}", get(handlers::api::export_result))
            // History
            .route("/history", get(handlers::api::history))
            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
