use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod auth;
mod config;
mod db;
mod doubt;
mod error;
mod i18n;
mod ingestion;
mod ollama;
mod quiz;
mod service;

use crate::config::AppConfig;
use crate::db::Database;
use crate::ollama::OllamaClient;
use crate::service::StudyBuddyService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting StudyBuddy service v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(AppConfig::load()?);
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    // Ensure data and upload directories exist
    std::fs::create_dir_all(config.storage.uploads_dir())?;

    // Initialize database
    let db_path = config.storage.database_path();
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    // Initialize Ollama client
    let ollama = Arc::new(OllamaClient::new(config.ollama.clone())?);
    if ollama.health_check().await? {
        info!(url = %config.ollama.base_url, "Ollama is available");
    } else {
        warn!(url = %config.ollama.base_url, "Ollama is not available");
    }

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics recorder not installed");
            None
        }
    };

    let service = Arc::new(StudyBuddyService::new(config.clone(), db, ollama));
    let app = api::router(service, metrics);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("studybuddy_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
