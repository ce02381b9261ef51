//! Pulsar: Heartbeat Ledger and Pixel Health Aggregation
//!
//! # Overview
//!
//! Pulsar ingests lightweight heartbeats reported by a browser snippet about
//! the marketing pixels on a monitored site (Google Tag Manager, GA4, Meta
//! Pixel), appends each one to a per-site ledger, and folds it into a rolling
//! per-site status.
//!
//! # Features
//!
//! - **Append-only ledger**: every heartbeat is stored verbatim, raw payload included
//! - **Pure aggregation**: channel and overall status rules live in [`aggregator`]
//! - **Atomic ingestion**: heartbeat append and status upsert commit together
//! - **Lost-update free**: the status merge runs inside the storage layer
//! - **Multiple Backends**: SQLite (default) and an in-memory store
//!
//! # Example
//!
//! ```no_run
//! use pulsar::{Ingestor, NewSite, SiteRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(pulsar::open("pixelwatch.db").await?);
//!     store.register_site(NewSite::new(1, "https://shop.example")).await?;
//!
//!     let ingestor = Ingestor::with_backend(store.clone());
//!     let id = ingestor
//!         .ingest(br#"{"siteUrl":"https://shop.example","gtmPresent":true}"#)
//!         .await?;
//!     println!("stored heartbeat {}", id);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod aggregator;
pub mod backends;
pub mod error;
pub mod ingest;
pub mod model;

#[cfg(feature = "sqlite")]
pub use backends::sqlite::{SqliteOptions, SqliteStore};

pub use aggregator::{ChannelStatuses, StatusUpdate};
pub use backends::memory::MemoryStore;
pub use error::{Error, Result};
pub use ingest::Ingestor;
pub use model::{
    ChannelIds, ChannelState, ExpectedPixels, Heartbeat, HeartbeatPayload, NewHeartbeat, NewSite,
    Observation, Site, SiteIdentity, SiteOverview, SiteStatus, SiteUpdate,
};

/// Internal site identifier
pub type SiteId = i64;

/// Owning organization identifier
pub type OrgId = i64;

/// Identifier of a stored heartbeat
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct HeartbeatId(pub i64);

impl fmt::Display for HeartbeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monitored pixel channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Google Tag Manager container
    Gtm,
    /// Google Analytics 4
    Ga4,
    /// Meta (Facebook) Pixel
    Meta,
}

impl Channel {
    /// All channels, in reporting order
    pub const ALL: [Channel; 3] = [Channel::Gtm, Channel::Ga4, Channel::Meta];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Gtm => write!(f, "gtm"),
            Channel::Ga4 => write!(f, "ga4"),
            Channel::Meta => write!(f, "meta"),
        }
    }
}

/// Health of a single channel as derived from the latest heartbeat
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    /// Confirmed firing
    Active,
    /// Not present or not firing
    Missing,
    /// Not firing because consent was explicitly withheld
    Blocked,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Active => write!(f, "active"),
            ChannelStatus::Missing => write!(f, "missing"),
            ChannelStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for ChannelStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ChannelStatus::Active),
            "missing" => Ok(ChannelStatus::Missing),
            "blocked" => Ok(ChannelStatus::Blocked),
            _ => Err(Error::storage(format!("Invalid channel status: {}", s))),
        }
    }
}

/// Overall site health, derived from the three channel statuses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every channel active
    Healthy,
    /// One channel missing, or none missing and some blocked
    Degraded,
    /// Two or more channels missing
    Critical,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "healthy"),
            OverallStatus::Degraded => write!(f, "degraded"),
            OverallStatus::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for OverallStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(OverallStatus::Healthy),
            "degraded" => Ok(OverallStatus::Degraded),
            "critical" => Ok(OverallStatus::Critical),
            _ => Err(Error::storage(format!("Invalid overall status: {}", s))),
        }
    }
}

/// Maps a public site URL to the internal site identity
///
/// Matching is exact: no normalization, no trailing-slash folding.
#[async_trait]
pub trait SiteResolver: Send + Sync {
    /// Resolve `site_url`, failing with [`Error::SiteNotFound`] if unregistered
    async fn resolve(&self, site_url: &str) -> Result<SiteIdentity>;
}

/// Minimal site registry used to seed and inspect monitored sites
#[async_trait]
pub trait SiteRegistry: Send + Sync {
    /// Register a site together with its seeded neutral status row
    async fn register_site(&self, site: NewSite) -> Result<Site>;

    /// Look up a site by id
    async fn get_site(&self, site_id: SiteId) -> Result<Option<Site>>;

    /// All sites owned by an organization with their current status, newest first
    async fn sites_for_org(&self, org_id: OrgId) -> Result<Vec<SiteOverview>>;

    /// Apply a partial edit to a site owned by `org_id`
    ///
    /// Returns `None` if no such site exists for that organization. Moving a
    /// site onto a registered URL fails with [`Error::DuplicateSite`].
    async fn update_site(
        &self,
        org_id: OrgId,
        site_id: SiteId,
        update: SiteUpdate,
    ) -> Result<Option<Site>>;

    /// Delete a site owned by `org_id`, cascading to its heartbeats and status
    ///
    /// Returns `false` if no such site exists for that organization.
    async fn remove_site(&self, org_id: OrgId, site_id: SiteId) -> Result<bool>;
}

/// Core trait for the heartbeat ledger and per-site status
///
/// Implementations must make [`HeartbeatStore::record`] atomic: either the
/// heartbeat row and the merged status are both visible afterwards, or
/// neither is. The merge must happen inside the storage layer so that
/// concurrent records for the same site never lose an update.
#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Append a heartbeat and fold `update` into the site's status
    async fn record(&self, heartbeat: NewHeartbeat, update: &StatusUpdate)
        -> Result<HeartbeatId>;

    /// Current status of a site, if it has a status row
    async fn site_status(&self, site_id: SiteId) -> Result<Option<SiteStatus>>;

    /// The `limit` most recent heartbeats of a site, newest first
    async fn recent_heartbeats(&self, site_id: SiteId, limit: u32) -> Result<Vec<Heartbeat>>;
}

/// Open a SQLite-backed store at the specified path
///
/// Creates the database if needed and runs the embedded migrations.
#[cfg(feature = "sqlite")]
pub async fn open(path: &str) -> Result<SqliteStore> {
    SqliteStore::open(path).await
}
