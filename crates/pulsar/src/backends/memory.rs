//! In-memory backend
//!
//! All state sits behind one async mutex, so an append and its status merge
//! happen under the same lock and are atomic with respect to every other
//! operation. Nothing survives the process.

use crate::aggregator::{self, StatusUpdate};
use crate::model::{
    Heartbeat, NewHeartbeat, NewSite, Site, SiteIdentity, SiteOverview, SiteStatus, SiteUpdate,
};
use crate::{
    Error, HeartbeatId, HeartbeatStore, OrgId, Result, SiteId, SiteRegistry, SiteResolver,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_site_id: SiteId,
    next_heartbeat_id: i64,
    sites: BTreeMap<SiteId, Site>,
    statuses: HashMap<SiteId, SiteStatus>,
    heartbeats: Vec<Heartbeat>,
}

/// In-memory heartbeat store for unit tests and local development
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored heartbeats across all sites (primarily for tests)
    pub async fn heartbeat_count(&self) -> usize {
        self.inner.lock().await.heartbeats.len()
    }
}

#[async_trait]
impl SiteResolver for MemoryStore {
    async fn resolve(&self, site_url: &str) -> Result<SiteIdentity> {
        let inner = self.inner.lock().await;
        inner
            .sites
            .values()
            .find(|site| site.url == site_url)
            .map(Site::identity)
            .ok_or_else(|| Error::site_not_found(site_url))
    }
}

#[async_trait]
impl SiteRegistry for MemoryStore {
    async fn register_site(&self, site: NewSite) -> Result<Site> {
        if site.url.is_empty() {
            return Err(Error::bad_request("Site URL is required"));
        }

        let mut inner = self.inner.lock().await;
        if inner.sites.values().any(|existing| existing.url == site.url) {
            return Err(Error::DuplicateSite { url: site.url });
        }

        inner.next_site_id += 1;
        let id = inner.next_site_id;
        let created_at = Utc::now();
        let created_at =
            chrono::DateTime::from_timestamp_millis(created_at.timestamp_millis()).unwrap_or(created_at);
        let record = Site {
            id,
            org_id: site.org_id,
            url: site.url,
            name: site.name,
            expected: site.expected,
            created_at,
        };
        inner.sites.insert(id, record.clone());
        inner.statuses.insert(id, SiteStatus::seeded(id));
        Ok(record)
    }

    async fn get_site(&self, site_id: SiteId) -> Result<Option<Site>> {
        Ok(self.inner.lock().await.sites.get(&site_id).cloned())
    }

    async fn sites_for_org(&self, org_id: OrgId) -> Result<Vec<SiteOverview>> {
        let inner = self.inner.lock().await;
        let mut sites: Vec<SiteOverview> = inner
            .sites
            .values()
            .filter(|site| site.org_id == org_id)
            .map(|site| SiteOverview {
                site: site.clone(),
                status: inner
                    .statuses
                    .get(&site.id)
                    .cloned()
                    .unwrap_or_else(|| SiteStatus::seeded(site.id)),
            })
            .collect();
        sites.sort_by(|a, b| {
            b.site
                .created_at
                .cmp(&a.site.created_at)
                .then(b.site.id.cmp(&a.site.id))
        });
        Ok(sites)
    }

    async fn update_site(
        &self,
        org_id: OrgId,
        site_id: SiteId,
        update: SiteUpdate,
    ) -> Result<Option<Site>> {
        if update.url.as_deref() == Some("") {
            return Err(Error::bad_request("Site URL cannot be empty"));
        }

        let mut inner = self.inner.lock().await;
        let updated = match inner.sites.get(&site_id) {
            Some(site) if site.org_id == org_id => update.apply_to(site),
            _ => return Ok(None),
        };
        if inner
            .sites
            .values()
            .any(|other| other.id != site_id && other.url == updated.url)
        {
            return Err(Error::DuplicateSite { url: updated.url });
        }

        inner.sites.insert(site_id, updated.clone());
        Ok(Some(updated))
    }

    async fn remove_site(&self, org_id: OrgId, site_id: SiteId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.sites.get(&site_id) {
            Some(site) if site.org_id == org_id => {}
            _ => return Ok(false),
        }
        inner.sites.remove(&site_id);
        inner.statuses.remove(&site_id);
        inner.heartbeats.retain(|hb| hb.site_id != site_id);
        Ok(true)
    }
}

#[async_trait]
impl HeartbeatStore for MemoryStore {
    async fn record(&self, heartbeat: NewHeartbeat, update: &StatusUpdate) -> Result<HeartbeatId> {
        let mut inner = self.inner.lock().await;
        // Same guarantee as the foreign key in the SQL schema.
        if !inner.sites.contains_key(&heartbeat.site_id) {
            return Err(Error::UnknownSite(heartbeat.site_id));
        }

        inner.next_heartbeat_id += 1;
        let id = HeartbeatId(inner.next_heartbeat_id);
        let site_id = heartbeat.site_id;
        inner.heartbeats.push(Heartbeat {
            id,
            site_id,
            timestamp: heartbeat.received_at,
            observation: heartbeat.observation,
            raw_payload: heartbeat.raw_payload,
        });

        let previous = inner
            .statuses
            .get(&site_id)
            .cloned()
            .unwrap_or_else(|| SiteStatus::seeded(site_id));
        inner
            .statuses
            .insert(site_id, aggregator::merge(&previous, update));

        Ok(id)
    }

    async fn site_status(&self, site_id: SiteId) -> Result<Option<SiteStatus>> {
        Ok(self.inner.lock().await.statuses.get(&site_id).cloned())
    }

    async fn recent_heartbeats(&self, site_id: SiteId, limit: u32) -> Result<Vec<Heartbeat>> {
        let inner = self.inner.lock().await;
        let mut beats: Vec<Heartbeat> = inner
            .heartbeats
            .iter()
            .filter(|hb| hb.site_id == site_id)
            .cloned()
            .collect();
        beats.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        beats.truncate(limit as usize);
        Ok(beats)
    }
}
