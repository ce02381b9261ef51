//! API endpoints module

pub mod health;
pub mod ingest;
pub mod sites;

pub use health::health;
pub use ingest::{ingest_heartbeat, IngestResponse};
pub use sites::{
    create_site, delete_site, get_site, get_site_heartbeats, get_site_status, list_sites,
    update_site, CreateSiteRequest, HeartbeatQuery, UpdateSiteRequest,
};
