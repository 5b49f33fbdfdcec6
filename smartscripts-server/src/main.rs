use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use smartscripts_server::config::Config;
use smartscripts_server::repository::SqliteRepository;
use smartscripts_server::{app_router, AppState, ReviewStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!(
        "Starting SmartScripts review service v{}",
        smartscripts_server::get_service_version()
    );

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let store = match &config.database_path {
        Some(db_path) => {
            info!("Using review database: {}", db_path.display());
            let repo = SqliteRepository::new(db_path)
                .with_context(|| format!("Failed to open database {}", db_path.display()))?;
            ReviewStore::with_repository(Arc::new(repo))
        }
        None => {
            info!("REVIEW_DB_PATH not set, reviews are held in memory only");
            ReviewStore::new()
        }
    };

    let app = app_router(Arc::new(AppState::new(store)));

    let listener = TcpListener::bind(config.listen_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_address()))?;
    info!("Server listening on {}", config.listen_address());

    axum::serve(listener, app).await?;

    Ok(())
}
