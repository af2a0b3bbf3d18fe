//! ss2022-relay: SIP022 server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ss2022_relay::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("SS2022_RELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ss2022-relay.json"));

    info!(path = %config_path.display(), "loading configuration");
    let config = ServerConfig::load_from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    let cipher = config
        .cipher_kind()
        .context("configuration validated but cipher_kind() returned None")?;
    let psk = config
        .key_bytes()
        .context("configuration validated but key is not valid hex")?;

    let metrics_addr: SocketAddr = std::env::var("SS2022_RELAY_METRICS_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 9090)));

    info!(port = config.port, method = %config.method, "starting ss2022-relay");
    ss2022_relay::start_blocking(config.port, psk, cipher, metrics_addr).await?;

    Ok(())
}
