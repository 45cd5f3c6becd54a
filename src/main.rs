// src/main.rs

use nila_sso::config::GatewayFileConfig;
use nila_sso::server::{self, AppState};
use nila_sso::validator::TokenValidator;
use std::error::Error;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "NILA_SSO_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/nila-sso.yaml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 1. Load configuration: first argument, then env, then the default path.
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let file_config = GatewayFileConfig::from_file(&config_path)?;

    // 2. Logging. RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&file_config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!("Loaded configuration from {}", config_path);

    // 3. Validator and key cache.
    let gateway_config = file_config.to_gateway_config()?;
    let background_refresh = gateway_config.key_cache.background_refresh;
    let validator = TokenValidator::new(gateway_config)?;

    let ready = validator.resolver().warm_up().await;
    tracing::info!("{} provider key set(s) ready at start-up", ready);
    if background_refresh {
        let tasks = validator.resolver().spawn_background_refresh();
        tracing::info!("Started {} background key refresh task(s)", tasks.len());
    }

    // 4. HTTP surface.
    let app = server::router(AppState::new(validator));

    let listener = TcpListener::bind(&file_config.listen_addr).await?;
    tracing::info!("SSO gateway listening on {}", listener.local_addr()?);
    tracing::info!(
        "Test with: curl -H \"Authorization: Bearer <TOKEN>\" http://{}/api/auth/validate",
        file_config.listen_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("SSO gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
