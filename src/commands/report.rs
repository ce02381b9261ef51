/*!
 * `status` and `heartbeats`: inspect what a site has reported
 */

use crate::error::{AppError, Result};
use pulsar::Error as StoreError;
use pulsar::{Heartbeat, HeartbeatStore, SiteId, SiteStatus};

/// Current status of a site
pub async fn site_status(store: &dyn HeartbeatStore, site_id: SiteId) -> Result<SiteStatus> {
    store
        .site_status(site_id)
        .await?
        .ok_or(AppError::Store(StoreError::UnknownSite(site_id)))
}

/// Most recent heartbeats of a site, newest first
///
/// Every registered site has a status row, so a missing row means the
/// site does not exist.
pub async fn recent_heartbeats(
    store: &dyn HeartbeatStore,
    site_id: SiteId,
    limit: u32,
) -> Result<Vec<Heartbeat>> {
    if limit == 0 {
        return Err(AppError::InvalidInput("--limit must be at least 1".to_string()));
    }
    site_status(store, site_id).await?;
    Ok(store.recent_heartbeats(site_id, limit).await?)
}
