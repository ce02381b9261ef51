//! Pixelwatch Server - Binary entry point
//!
//! Reads `PIXELWATCH_DB`, `PIXELWATCH_HOST` and `PIXELWATCH_PORT`; the
//! `pixelwatch serve` command offers the full configuration surface.

use pixelwatch_server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pixelwatch_server=debug,pulsar=info".into()),
        )
        .json()
        .init();

    let mut config = ServerConfig::default();
    if let Ok(db) = std::env::var("PIXELWATCH_DB") {
        config.database = db;
    }
    if let Ok(host) = std::env::var("PIXELWATCH_HOST") {
        config.host = host;
    }
    if let Ok(port) = std::env::var("PIXELWATCH_PORT") {
        config.port = port.parse()?;
    }

    pixelwatch_server::start_server(config)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}
