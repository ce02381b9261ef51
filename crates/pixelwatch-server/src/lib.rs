//! Pixelwatch Server
//!
//! Public heartbeat ingest endpoint plus the read API the dashboard uses to
//! inspect sites, their rolling pixel status and recent heartbeats.
//! Built with Axum on top of the `pulsar` heartbeat store.

pub mod api;
pub mod error;
pub mod extract;
pub mod server;
pub mod state;

pub use error::{WebError, WebResult};
pub use server::build_router;
pub use state::{ApiLimits, AppState};

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub limits: ApiLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database: "pixelwatch.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5000,
            limits: ApiLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Socket address string the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Start the API server and run until shutdown
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error + Send>> {
    server::run_server(config).await
}
