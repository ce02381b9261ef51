//! SQLite backend implementation
//!
//! Provides persistent storage using SQLite with WAL mode for concurrency.
//! This is the default backend.
//!
//! `record` runs the heartbeat insert and the status upsert in one
//! transaction. The upsert is a single `INSERT … ON CONFLICT DO UPDATE`
//! statement that reads the previous row and writes the merged one, so two
//! writers for the same site can never lose each other's increment. The
//! first statement of the transaction is a write, which lets SQLite's busy
//! handler queue concurrent writers instead of failing them.

use crate::aggregator::StatusUpdate;
use crate::model::{
    ChannelState, ExpectedPixels, Heartbeat, NewHeartbeat, NewSite, Observation, Site,
    SiteIdentity, SiteOverview, SiteStatus, SiteUpdate,
};
use crate::{
    Channel, Error, HeartbeatId, HeartbeatStore, OrgId, Result, SiteId, SiteRegistry,
    SiteResolver,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// Connection settings for [`SqliteStore`]
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Maximum pooled connections
    pub max_connections: u32,
    /// How long a writer waits for the database lock before failing
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// SQLite-backed heartbeat store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a SQLite database at the specified path
    ///
    /// Automatically runs migrations to set up the schema.
    pub async fn open(path: &str) -> Result<Self> {
        Self::open_with(path, SqliteOptions::default()).await
    }

    /// Open with explicit connection settings
    pub async fn open_with(path: &str, options: SqliteOptions) -> Result<Self> {
        let db_url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{}", path)
        };

        let connect = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect_with(connect)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(path = %db_url, "Heartbeat store opened");
        Ok(Self { pool })
    }

    /// Get the underlying pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::storage(format!("Invalid timestamp: {}", ms)))
}

fn opt_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

fn row_to_site(row: &SqliteRow) -> Result<Site> {
    Ok(Site {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        url: row.try_get("url")?,
        name: row.try_get("name")?,
        expected: ExpectedPixels {
            gtm_container_id: row.try_get("gtm_container_id")?,
            ga4_measurement_id: row.try_get("ga4_measurement_id")?,
            meta_pixel_id: row.try_get("meta_pixel_id")?,
        },
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

fn row_to_channel(row: &SqliteRow, channel: Channel) -> Result<ChannelState> {
    let (status_col, seen_col, id_col) = match channel {
        Channel::Gtm => ("gtm_status", "gtm_last_seen", "gtm_container_id"),
        Channel::Ga4 => ("ga4_status", "ga4_last_seen", "ga4_measurement_id"),
        Channel::Meta => ("meta_status", "meta_last_seen", "meta_pixel_id"),
    };
    let status: Option<String> = row.try_get(status_col)?;

    Ok(ChannelState {
        status: status.as_deref().map(str::parse).transpose()?,
        last_seen: opt_from_millis(row.try_get(seen_col)?)?,
        last_id: row.try_get(id_col)?,
    })
}

fn row_to_status(row: &SqliteRow) -> Result<SiteStatus> {
    let overall: Option<String> = row.try_get("overall_status")?;

    Ok(SiteStatus {
        site_id: row.try_get("site_id")?,
        gtm: row_to_channel(row, Channel::Gtm)?,
        ga4: row_to_channel(row, Channel::Ga4)?,
        meta: row_to_channel(row, Channel::Meta)?,
        overall: overall.as_deref().map(str::parse).transpose()?,
        issue_count: row.try_get::<i64, _>("issues_count")? as u32,
        total_heartbeats: row.try_get::<i64, _>("total_heartbeats")? as u64,
        last_heartbeat_at: opt_from_millis(row.try_get("last_heartbeat_at")?)?,
    })
}

fn row_to_heartbeat(row: &SqliteRow) -> Result<Heartbeat> {
    let consent_state: Option<String> = row.try_get("consent_state")?;

    Ok(Heartbeat {
        id: HeartbeatId(row.try_get("id")?),
        site_id: row.try_get("site_id")?,
        timestamp: from_millis(row.try_get("timestamp")?)?,
        observation: Observation {
            page_url: row.try_get("page_url")?,
            user_agent: row.try_get("user_agent")?,
            gtm_present: row.try_get("gtm_present")?,
            gtm_container_id: row.try_get("gtm_container_id")?,
            ga4_present: row.try_get("ga4_present")?,
            ga4_tag_present: row.try_get("ga4_tag_present")?,
            ga4_collect_seen: row.try_get("ga4_collect_seen")?,
            ga4_measurement_id: row.try_get("ga4_measurement_id")?,
            meta_pixel_present: row.try_get("meta_pixel_present")?,
            meta_tr_seen: row.try_get("meta_tr_seen")?,
            meta_pixel_id: row.try_get("meta_pixel_id")?,
            consent_state: consent_state
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            consent_granted: row.try_get("consent_granted")?,
        },
        raw_payload: row.try_get("raw_payload")?,
    })
}

const STATUS_COLUMNS: &str = "site_id, gtm_status, gtm_last_seen, gtm_container_id, \
     ga4_status, ga4_last_seen, ga4_measurement_id, \
     meta_status, meta_last_seen, meta_pixel_id, \
     overall_status, issues_count, total_heartbeats, last_heartbeat_at";

// Mirrors aggregator::merge. A channel's last-seen only advances when the
// incoming status is active, and never moves backwards.
const UPSERT_STATUS: &str = r#"
    INSERT INTO site_status (
        site_id,
        gtm_status, gtm_last_seen, gtm_container_id,
        ga4_status, ga4_last_seen, ga4_measurement_id,
        meta_status, meta_last_seen, meta_pixel_id,
        overall_status, issues_count, total_heartbeats, last_heartbeat_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
    ON CONFLICT (site_id) DO UPDATE SET
        gtm_status = excluded.gtm_status,
        gtm_last_seen = CASE WHEN excluded.gtm_status = 'active'
            THEN MAX(COALESCE(site_status.gtm_last_seen, excluded.gtm_last_seen), excluded.gtm_last_seen)
            ELSE site_status.gtm_last_seen END,
        gtm_container_id = COALESCE(excluded.gtm_container_id, site_status.gtm_container_id),
        ga4_status = excluded.ga4_status,
        ga4_last_seen = CASE WHEN excluded.ga4_status = 'active'
            THEN MAX(COALESCE(site_status.ga4_last_seen, excluded.ga4_last_seen), excluded.ga4_last_seen)
            ELSE site_status.ga4_last_seen END,
        ga4_measurement_id = COALESCE(excluded.ga4_measurement_id, site_status.ga4_measurement_id),
        meta_status = excluded.meta_status,
        meta_last_seen = CASE WHEN excluded.meta_status = 'active'
            THEN MAX(COALESCE(site_status.meta_last_seen, excluded.meta_last_seen), excluded.meta_last_seen)
            ELSE site_status.meta_last_seen END,
        meta_pixel_id = COALESCE(excluded.meta_pixel_id, site_status.meta_pixel_id),
        overall_status = excluded.overall_status,
        issues_count = excluded.issues_count,
        total_heartbeats = site_status.total_heartbeats + 1,
        last_heartbeat_at = excluded.last_heartbeat_at
"#;

#[async_trait]
impl SiteResolver for SqliteStore {
    async fn resolve(&self, site_url: &str) -> Result<SiteIdentity> {
        let row = sqlx::query("SELECT id, org_id FROM sites WHERE url = ?")
            .bind(site_url)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(SiteIdentity {
                site_id: r.try_get("id")?,
                org_id: r.try_get("org_id")?,
            }),
            None => Err(Error::site_not_found(site_url)),
        }
    }
}

#[async_trait]
impl SiteRegistry for SqliteStore {
    async fn register_site(&self, site: NewSite) -> Result<Site> {
        if site.url.is_empty() {
            return Err(Error::bad_request("Site URL is required"));
        }

        let created_at = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO sites (org_id, url, name, gtm_container_id, ga4_measurement_id, meta_pixel_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id, org_id, url, name, gtm_container_id, ga4_measurement_id, meta_pixel_id, created_at",
        )
        .bind(site.org_id)
        .bind(&site.url)
        .bind(&site.name)
        .bind(&site.expected.gtm_container_id)
        .bind(&site.expected.ga4_measurement_id)
        .bind(&site.expected.meta_pixel_id)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(Error::DuplicateSite { url: site.url });
            }
            Err(e) => return Err(e.into()),
        };
        let record = row_to_site(&row)?;

        sqlx::query("INSERT INTO site_status (site_id) VALUES (?)")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn get_site(&self, site_id: SiteId) -> Result<Option<Site>> {
        let row = sqlx::query(
            "SELECT id, org_id, url, name, gtm_container_id, ga4_measurement_id, meta_pixel_id, created_at
             FROM sites WHERE id = ?",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_site).transpose()
    }

    async fn sites_for_org(&self, org_id: OrgId) -> Result<Vec<SiteOverview>> {
        let sites = sqlx::query(
            "SELECT id, org_id, url, name, gtm_container_id, ga4_measurement_id, meta_pixel_id, created_at
             FROM sites WHERE org_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        let statuses = sqlx::query(&format!(
            "SELECT {} FROM site_status
             WHERE site_id IN (SELECT id FROM sites WHERE org_id = ?)",
            STATUS_COLUMNS
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_site = std::collections::HashMap::new();
        for row in &statuses {
            let status = row_to_status(row)?;
            by_site.insert(status.site_id, status);
        }

        sites
            .iter()
            .map(|row| {
                let site = row_to_site(row)?;
                let status = by_site
                    .remove(&site.id)
                    .unwrap_or_else(|| SiteStatus::seeded(site.id));
                Ok(SiteOverview { site, status })
            })
            .collect()
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

        let updated = sqlx::query(
            "UPDATE sites
             SET url = COALESCE(?, url),
                 name = COALESCE(?, name),
                 gtm_container_id = COALESCE(?, gtm_container_id),
                 ga4_measurement_id = COALESCE(?, ga4_measurement_id),
                 meta_pixel_id = COALESCE(?, meta_pixel_id)
             WHERE id = ? AND org_id = ?
             RETURNING id, org_id, url, name, gtm_container_id, ga4_measurement_id, meta_pixel_id, created_at",
        )
        .bind(&update.url)
        .bind(&update.name)
        .bind(&update.expected.gtm_container_id)
        .bind(&update.expected.ga4_measurement_id)
        .bind(&update.expected.meta_pixel_id)
        .bind(site_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await;

        match updated {
            Ok(row) => row.as_ref().map(row_to_site).transpose(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::DuplicateSite {
                    url: update.url.unwrap_or_default(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_site(&self, org_id: OrgId, site_id: SiteId) -> Result<bool> {
        // Heartbeats and status go with the site via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM sites WHERE id = ? AND org_id = ?")
            .bind(site_id)
            .bind(org_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl HeartbeatStore for SqliteStore {
    #[tracing::instrument(level = "trace", name = "pulsar.sqlite.record", skip_all, fields(site_id = heartbeat.site_id))]
    async fn record(&self, heartbeat: NewHeartbeat, update: &StatusUpdate) -> Result<HeartbeatId> {
        let obs = &heartbeat.observation;
        let consent_state = obs
            .consent_state
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let observed_at = to_millis(update.observed_at);

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO heartbeats (
                site_id, timestamp,
                gtm_present, gtm_container_id,
                ga4_present, ga4_tag_present, ga4_collect_seen, ga4_measurement_id,
                meta_pixel_present, meta_tr_seen, meta_pixel_id,
                consent_state, consent_granted, page_url, user_agent, raw_payload
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(heartbeat.site_id)
        .bind(to_millis(heartbeat.received_at))
        .bind(obs.gtm_present)
        .bind(&obs.gtm_container_id)
        .bind(obs.ga4_present)
        .bind(obs.ga4_tag_present)
        .bind(obs.ga4_collect_seen)
        .bind(&obs.ga4_measurement_id)
        .bind(obs.meta_pixel_present)
        .bind(obs.meta_tr_seen)
        .bind(&obs.meta_pixel_id)
        .bind(consent_state)
        .bind(obs.consent_granted)
        .bind(&obs.page_url)
        .bind(&obs.user_agent)
        .bind(&heartbeat.raw_payload)
        .fetch_one(&mut *tx)
        .await;

        // The site can vanish between resolution and this write.
        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                return Err(Error::UnknownSite(heartbeat.site_id));
            }
            Err(e) => return Err(e.into()),
        };
        let id: i64 = row.try_get("id")?;

        sqlx::query(UPSERT_STATUS)
            .bind(heartbeat.site_id)
            .bind(update.channels.gtm.to_string())
            .bind(update.last_seen_for(Channel::Gtm).map(to_millis))
            .bind(&update.ids.gtm)
            .bind(update.channels.ga4.to_string())
            .bind(update.last_seen_for(Channel::Ga4).map(to_millis))
            .bind(&update.ids.ga4)
            .bind(update.channels.meta.to_string())
            .bind(update.last_seen_for(Channel::Meta).map(to_millis))
            .bind(&update.ids.meta)
            .bind(update.overall.to_string())
            .bind(update.issue_count as i64)
            .bind(observed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(HeartbeatId(id))
    }

    async fn site_status(&self, site_id: SiteId) -> Result<Option<SiteStatus>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM site_status WHERE site_id = ?",
            STATUS_COLUMNS
        ))
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_status).transpose()
    }

    async fn recent_heartbeats(&self, site_id: SiteId, limit: u32) -> Result<Vec<Heartbeat>> {
        let rows = sqlx::query(
            "SELECT id, site_id, timestamp,
                    gtm_present, gtm_container_id,
                    ga4_present, ga4_tag_present, ga4_collect_seen, ga4_measurement_id,
                    meta_pixel_present, meta_tr_seen, meta_pixel_id,
                    consent_state, consent_granted, page_url, user_agent, raw_payload
             FROM heartbeats
             WHERE site_id = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(site_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_heartbeat).collect()
    }
}
