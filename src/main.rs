use std::sync::Arc;

use security_challenge::config;
use security_challenge::server::{app, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up CHALLENGE_*, STORAGE_*, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config::config().clone();
    tracing::info!("Starting security challenge in {:?} mode", config.environment);
    tracing::info!(
        backend = ?config.storage.backend,
        discovery = %config.api.discovery_base_url(),
        "progress storage and discovery target"
    );

    if security_challenge::is_development!() {
        tracing::debug!("development defaults: in-memory progress, short clue delays");
    }

    let port = config.api.port;
    let state = Arc::new(AppState::from_config(config));

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    println!("🚀 Security challenge listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await?;
    Ok(())
}
