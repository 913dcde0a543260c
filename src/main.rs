use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod db;
mod export;
mod history;
mod llm;
mod pipeline;
mod prompt;
mod session;
#[cfg(test)]
mod test_support;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Pick up GOOGLE_API_KEY and friends from .env before anything reads them
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {}", e);
        }
    }

    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(&args.log_format);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Ensure data directory exists
    let data_dir = PathBuf::from(&config.data_dir);
    if !data_dir.exists() {
        info!("Creating data directory: {}", config.data_dir);
        std::fs::create_dir_all(&data_dir)?;
    }

    if !PathBuf::from(&config.database.default_path).is_file() {
        warn!(
            "Default database {} not found; sessions must upload a database",
            config.database.default_path
        );
    }

    // Initialize LLM manager
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    let app_state = Arc::new(AppState::new(config.clone(), llm_manager));

    // Warm the prompt cache; requests report the failure themselves if it persists
    if let Err(e) = app_state.prompt.load().await {
        error!("Failed to load instruction prompt: {}", e);
    }

    // Start the web server
    info!("Starting SQLAsk server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e as Box<dyn std::error::Error>);
        }
    }

    Ok(())
}
