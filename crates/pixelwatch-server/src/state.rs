//! Shared application state

use crate::ServerConfig;
use pulsar::{HeartbeatStore, Ingestor, SiteRegistry, SiteResolver, SqliteOptions, SqliteStore};
use std::sync::Arc;
use std::time::Duration;

/// Request limits applied by the API
#[derive(Debug, Clone, Copy)]
pub struct ApiLimits {
    /// Heartbeats returned when `limit` is not given
    pub default_heartbeat_limit: u32,
    /// Upper bound for a requested `limit`
    pub max_heartbeat_limit: u32,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            default_heartbeat_limit: 50,
            max_heartbeat_limit: 500,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl ApiLimits {
    /// Resolve a requested heartbeat limit against the defaults
    pub fn heartbeat_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_heartbeat_limit)
            .clamp(1, self.max_heartbeat_limit.max(1))
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Heartbeat ingestion coordinator
    pub ingestor: Ingestor,

    /// Site registry for the read API
    pub sites: Arc<dyn SiteRegistry>,

    /// Heartbeat ledger and status reads
    pub heartbeats: Arc<dyn HeartbeatStore>,

    pub limits: ApiLimits,
}

impl AppState {
    /// Build state over a single backend that implements every store trait
    pub fn with_backend<B>(backend: Arc<B>, limits: ApiLimits) -> Self
    where
        B: SiteResolver + SiteRegistry + HeartbeatStore + 'static,
    {
        Self {
            ingestor: Ingestor::with_backend(backend.clone()),
            sites: backend.clone(),
            heartbeats: backend,
            limits,
        }
    }

    /// Open the SQLite store named by the config
    pub async fn new(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error + Send>> {
        let options = SqliteOptions {
            max_connections: config.max_connections,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };
        let store = SqliteStore::open_with(&config.database, options)
            .await
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send>)?;

        Ok(Self::with_backend(Arc::new(store), config.limits))
    }
}
