use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod llm;
mod pipeline;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::db::sql_server::SqlServerExecutor;
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Secrets usually live in a .env file next to the binary
    let dotenv = dotenvy::dotenv();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration; logging is not up yet so report to stderr
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    init_tracing(config.debug);
    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) => info!("No .env file loaded: {}", e),
    }

    info!(
        "Initializing Azure OpenAI generator for deployment '{}'",
        config.llm.deployment
    );
    let llm_manager = LlmManager::new(&config.llm, &config.search)?;

    info!(
        "SQL Server target: {} / {} as {}",
        config.database.host, config.database.name, config.database.user
    );
    let executor = Arc::new(SqlServerExecutor::new(config.database.clone()));

    let app_state = Arc::new(AppState::new(config.clone(), llm_manager, executor)?);

    // Start the web server
    info!("Starting server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
