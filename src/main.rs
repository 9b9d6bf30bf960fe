use aisha_backend::{
    api::{self, AppState},
    config::AppConfig,
};
use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Main entry point for the Aisha backend.
///
/// This function:
/// 1. Loads environment variables from .env file
/// 2. Connects to Redis and builds the provider clients
/// 3. Serves the API until Ctrl-C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load before the subscriber reads RUST_LOG
    dotenv().ok();

    FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .pretty()
        .init();

    info!("Starting Aisha backend");

    let config = AppConfig::from_env().context("invalid configuration")?;
    let state = AppState::from_config(&config)
        .await
        .context("failed to initialise services")?;
    let app = api::create_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("Server listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
