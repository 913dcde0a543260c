use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use std::sync::Arc;

use crate::web::handlers::api::{MAX_DISPLAY_ROWS, MIN_DISPLAY_ROWS};
use crate::web::state::AppState;
use crate::web::templates::render_template;

// Main UI entry point
pub async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let default_max_rows = state
        .config
        .session
        .default_max_rows
        .clamp(MIN_DISPLAY_ROWS, MAX_DISPLAY_ROWS);

    let context = minijinja::context! {
        title => "SQLAsk",
        default_max_rows => default_max_rows,
        min_rows => MIN_DISPLAY_ROWS,
        max_rows => MAX_DISPLAY_ROWS,
        execution_mode => state.pipeline.executor().mode().to_string(),
    };

    Html(render_template(&state.template_env, "index.html", context))
}
