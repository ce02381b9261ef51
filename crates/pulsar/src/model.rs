//! Data model: sites, heartbeats and the rolling site status
//!
//! Wire types use camelCase field names to match the snippet payload and the
//! dashboard's JSON.

use crate::{ChannelStatus, HeartbeatId, OrgId, OverallStatus, SiteId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Resolved identity of a monitored site
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteIdentity {
    pub site_id: SiteId,
    pub org_id: OrgId,
}

/// Pixel ids the site owner expects to see, when known
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedPixels {
    pub gtm_container_id: Option<String>,
    pub ga4_measurement_id: Option<String>,
    pub meta_pixel_id: Option<String>,
}

/// Registration request for a new site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSite {
    pub org_id: OrgId,
    pub url: String,
    pub name: Option<String>,
    #[serde(flatten)]
    pub expected: ExpectedPixels,
}

impl NewSite {
    /// Create a registration request with no name and no expected pixels
    pub fn new(org_id: OrgId, url: impl Into<String>) -> Self {
        Self {
            org_id,
            url: url.into(),
            name: None,
            expected: ExpectedPixels::default(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the expected pixel configuration
    pub fn with_expected(mut self, expected: ExpectedPixels) -> Self {
        self.expected = expected;
        self
    }
}

/// Partial edit of a registered site
///
/// `None` fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteUpdate {
    pub url: Option<String>,
    pub name: Option<String>,
    #[serde(flatten)]
    pub expected: ExpectedPixels,
}

impl SiteUpdate {
    /// Overlay this edit onto `site`
    pub fn apply_to(&self, site: &Site) -> Site {
        let mut updated = site.clone();
        if let Some(url) = &self.url {
            updated.url = url.clone();
        }
        if let Some(name) = &self.name {
            updated.name = Some(name.clone());
        }
        let expected = &self.expected;
        if expected.gtm_container_id.is_some() {
            updated.expected.gtm_container_id = expected.gtm_container_id.clone();
        }
        if expected.ga4_measurement_id.is_some() {
            updated.expected.ga4_measurement_id = expected.ga4_measurement_id.clone();
        }
        if expected.meta_pixel_id.is_some() {
            updated.expected.meta_pixel_id = expected.meta_pixel_id.clone();
        }
        updated
    }
}

/// A registered site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: SiteId,
    pub org_id: OrgId,
    pub url: String,
    pub name: Option<String>,
    #[serde(flatten)]
    pub expected: ExpectedPixels,
    pub created_at: DateTime<Utc>,
}

impl Site {
    pub fn identity(&self) -> SiteIdentity {
        SiteIdentity {
            site_id: self.id,
            org_id: self.org_id,
        }
    }
}

/// A site joined with its current status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteOverview {
    pub site: Site,
    pub status: SiteStatus,
}

/// What the snippet observed on one page load
///
/// Flags default to `false` when absent or `null`; ids and consent fields
/// stay `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default, deserialize_with = "null_as_false")]
    pub gtm_present: bool,
    #[serde(default)]
    pub gtm_container_id: Option<String>,

    #[serde(default, deserialize_with = "null_as_false")]
    pub ga4_present: bool,
    #[serde(default, deserialize_with = "null_as_false")]
    pub ga4_tag_present: bool,
    #[serde(default, deserialize_with = "null_as_false")]
    pub ga4_collect_seen: bool,
    #[serde(default)]
    pub ga4_measurement_id: Option<String>,

    #[serde(default, deserialize_with = "null_as_false")]
    pub meta_pixel_present: bool,
    #[serde(default, deserialize_with = "null_as_false")]
    pub meta_tr_seen: bool,
    #[serde(default)]
    pub meta_pixel_id: Option<String>,

    /// Consent snapshot as reported, never interpreted
    #[serde(default)]
    pub consent_state: Option<serde_json::Value>,
    /// `Some(false)` only when consent was explicitly denied
    #[serde(default)]
    pub consent_granted: Option<bool>,
}

impl Observation {
    /// Ids extracted by the snippet, blank strings treated as absent
    pub fn ids(&self) -> ChannelIds {
        ChannelIds {
            gtm: non_blank(&self.gtm_container_id),
            ga4: non_blank(&self.ga4_measurement_id),
            meta: non_blank(&self.meta_pixel_id),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Heartbeat payload as posted by the snippet
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(flatten)]
    pub observation: Observation,
}

impl HeartbeatPayload {
    /// The site URL, if present and non-empty
    pub fn site_url(&self) -> Option<&str> {
        self.site_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Per-channel ids extracted from one heartbeat
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelIds {
    pub gtm: Option<String>,
    pub ga4: Option<String>,
    pub meta: Option<String>,
}

/// A heartbeat ready to be appended to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewHeartbeat {
    pub site_id: SiteId,
    /// Server receipt time, never the client's clock
    pub received_at: DateTime<Utc>,
    pub observation: Observation,
    /// Payload exactly as received
    pub raw_payload: String,
}

/// A stored heartbeat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub id: HeartbeatId,
    pub site_id: SiteId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub observation: Observation,
    pub raw_payload: String,
}

/// Rolling state of one channel
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    /// `None` until the first heartbeat
    pub status: Option<ChannelStatus>,
    /// Last time the channel was `active`; never cleared once set
    pub last_seen: Option<DateTime<Utc>>,
    /// Last id observed for the channel; never erased by an absent id
    pub last_id: Option<String>,
}

/// Current belief about a site's pixel health
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatus {
    pub site_id: SiteId,
    pub gtm: ChannelState,
    pub ga4: ChannelState,
    pub meta: ChannelState,
    /// `None` until the first heartbeat
    pub overall: Option<OverallStatus>,
    pub issue_count: u32,
    pub total_heartbeats: u64,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl SiteStatus {
    /// Neutral status of a site that has not reported yet
    pub fn seeded(site_id: SiteId) -> Self {
        Self {
            site_id,
            gtm: ChannelState::default(),
            ga4: ChannelState::default(),
            meta: ChannelState::default(),
            overall: None,
            issue_count: 0,
            total_heartbeats: 0,
            last_heartbeat_at: None,
        }
    }
}
