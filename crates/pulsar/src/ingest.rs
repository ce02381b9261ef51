//! Ingestion coordinator
//!
//! Validates a heartbeat, resolves its site, and hands the heartbeat plus
//! the computed [`StatusUpdate`] to the store, which appends and merges in
//! one atomic unit. Nothing here retries: every failure goes back to the
//! caller unchanged.

use crate::aggregator::StatusUpdate;
use crate::model::{HeartbeatPayload, NewHeartbeat};
use crate::{Error, HeartbeatId, HeartbeatStore, Result, SiteResolver};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Entry point for inbound heartbeats
#[derive(Clone)]
pub struct Ingestor {
    resolver: Arc<dyn SiteResolver>,
    store: Arc<dyn HeartbeatStore>,
}

impl Ingestor {
    /// Create an ingestor from separate resolver and store handles
    pub fn new(resolver: Arc<dyn SiteResolver>, store: Arc<dyn HeartbeatStore>) -> Self {
        Self { resolver, store }
    }

    /// Create an ingestor over a backend that both resolves sites and stores heartbeats
    pub fn with_backend<B>(backend: Arc<B>) -> Self
    where
        B: SiteResolver + HeartbeatStore + 'static,
    {
        Self {
            resolver: backend.clone(),
            store: backend,
        }
    }

    /// Ingest a raw request body
    ///
    /// The body is stored verbatim as the heartbeat's raw payload.
    pub async fn ingest(&self, body: &[u8]) -> Result<HeartbeatId> {
        let payload: HeartbeatPayload = serde_json::from_slice(body)
            .map_err(|e| Error::bad_request(format!("Malformed heartbeat payload: {}", e)))?;
        // Parsing succeeded, so the body is valid UTF-8.
        let raw = String::from_utf8_lossy(body).into_owned();
        self.ingest_at(payload, raw, now()).await
    }

    /// Ingest an already-parsed payload, re-serializing it as the raw payload
    pub async fn ingest_payload(&self, payload: HeartbeatPayload) -> Result<HeartbeatId> {
        let raw = serde_json::to_string(&payload)?;
        self.ingest_at(payload, raw, now()).await
    }

    /// Ingest with an explicit receipt time
    #[tracing::instrument(level = "debug", name = "pulsar.ingest", skip_all, fields(site_url = tracing::field::Empty))]
    pub async fn ingest_at(
        &self,
        payload: HeartbeatPayload,
        raw_payload: String,
        received_at: DateTime<Utc>,
    ) -> Result<HeartbeatId> {
        let site_url = payload
            .site_url()
            .ok_or_else(|| Error::bad_request("siteUrl is required"))?;
        tracing::Span::current().record("site_url", site_url);

        let site = self.resolver.resolve(site_url).await?;

        let update = StatusUpdate::from_observation(&payload.observation, received_at);
        let heartbeat = NewHeartbeat {
            site_id: site.site_id,
            received_at,
            observation: payload.observation,
            raw_payload,
        };

        let id = self.store.record(heartbeat, &update).await?;
        tracing::debug!(
            site_id = site.site_id,
            heartbeat_id = %id,
            overall = %update.overall,
            issues = update.issue_count,
            "Heartbeat recorded"
        );
        Ok(id)
    }
}

/// Current time truncated to the millisecond precision the stores keep
fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::model::NewSite;
    use crate::{ChannelStatus, OverallStatus, SiteRegistry};
    use chrono::TimeZone;

    async fn store_with_site(url: &str) -> (Arc<MemoryStore>, i64) {
        let store = Arc::new(MemoryStore::new());
        let site = store.register_site(NewSite::new(1, url)).await.unwrap();
        (store, site.id)
    }

    #[tokio::test]
    async fn test_missing_site_url_is_bad_request() {
        let (store, site_id) = store_with_site("https://a.example").await;
        let ingestor = Ingestor::with_backend(store.clone());

        let err = ingestor.ingest(br#"{"gtmPresent": true}"#).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let err = ingestor.ingest(br#"{"siteUrl": ""}"#).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let status = store.site_status(site_id).await.unwrap().unwrap();
        assert_eq!(status.total_heartbeats, 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let (store, _) = store_with_site("https://a.example").await;
        let ingestor = Ingestor::with_backend(store);

        let err = ingestor.ingest(b"not json").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let err = ingestor.ingest(b"[1, 2, 3]").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_site_leaves_no_trace() {
        let (store, site_id) = store_with_site("https://a.example").await;
        let ingestor = Ingestor::with_backend(store.clone());

        let err = ingestor
            .ingest(br#"{"siteUrl": "https://a.example/", "gtmPresent": true}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SiteNotFound { .. }));

        assert!(store.recent_heartbeats(site_id, 10).await.unwrap().is_empty());
        let status = store.site_status(site_id).await.unwrap().unwrap();
        assert_eq!(status, crate::SiteStatus::seeded(site_id));
    }

    #[tokio::test]
    async fn test_raw_body_is_stored_verbatim() {
        let (store, site_id) = store_with_site("https://a.example").await;
        let ingestor = Ingestor::with_backend(store.clone());

        let body = br#"{"siteUrl":"https://a.example","gtmPresent":true,"extra":{"x":1}}"#;
        let id = ingestor.ingest(body).await.unwrap();

        let beats = store.recent_heartbeats(site_id, 1).await.unwrap();
        assert_eq!(beats[0].id, id);
        assert_eq!(beats[0].raw_payload.as_bytes(), body);
    }

    #[tokio::test]
    async fn test_two_heartbeat_scenario() {
        let (store, site_id) = store_with_site("https://a.example").await;
        let ingestor = Ingestor::with_backend(store.clone());
        let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap();

        let first: HeartbeatPayload = serde_json::from_str(
            r#"{"siteUrl":"https://a.example","gtmPresent":true,
                "ga4CollectSeen":false,"consentGranted":false,"metaTrSeen":false}"#,
        )
        .unwrap();
        ingestor.ingest_at(first, String::new(), t1).await.unwrap();

        let status = store.site_status(site_id).await.unwrap().unwrap();
        assert_eq!(status.gtm.status, Some(ChannelStatus::Active));
        assert_eq!(status.ga4.status, Some(ChannelStatus::Blocked));
        assert_eq!(status.meta.status, Some(ChannelStatus::Blocked));
        assert_eq!(status.overall, Some(OverallStatus::Degraded));
        assert_eq!(status.issue_count, 2);

        let second: HeartbeatPayload = serde_json::from_str(
            r#"{"siteUrl":"https://a.example","gtmPresent":false,
                "ga4CollectSeen":true,"metaTrSeen":true}"#,
        )
        .unwrap();
        ingestor.ingest_at(second, String::new(), t2).await.unwrap();

        let status = store.site_status(site_id).await.unwrap().unwrap();
        assert_eq!(status.gtm.status, Some(ChannelStatus::Missing));
        assert_eq!(status.ga4.status, Some(ChannelStatus::Active));
        assert_eq!(status.meta.status, Some(ChannelStatus::Active));
        assert_eq!(status.overall, Some(OverallStatus::Degraded));
        assert_eq!(status.issue_count, 1);
        assert_eq!(status.gtm.last_seen, Some(t1));
        assert_eq!(status.ga4.last_seen, Some(t2));
        assert_eq!(status.meta.last_seen, Some(t2));
        assert_eq!(status.total_heartbeats, 2);
        assert_eq!(status.last_heartbeat_at, Some(t2));
    }

    #[tokio::test]
    async fn test_ingest_payload_serializes_raw() {
        let (store, site_id) = store_with_site("https://a.example").await;
        let ingestor = Ingestor::with_backend(store.clone());

        let payload = HeartbeatPayload {
            site_url: Some("https://a.example".to_string()),
            ..Default::default()
        };
        ingestor.ingest_payload(payload).await.unwrap();

        let beats = store.recent_heartbeats(site_id, 1).await.unwrap();
        let raw: serde_json::Value = serde_json::from_str(&beats[0].raw_payload).unwrap();
        assert_eq!(raw["siteUrl"], "https://a.example");
    }
}
