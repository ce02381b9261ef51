//! Status aggregation rules
//!
//! Everything here is pure: no storage, no clock. Backends call [`merge`] (or
//! encode the same rules in their native upsert) while holding whatever
//! guarantees atomicity for them.

use crate::model::{ChannelIds, ChannelState, Observation, SiteStatus};
use crate::{Channel, ChannelStatus, OverallStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of each channel derived from a single heartbeat
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelStatuses {
    pub gtm: ChannelStatus,
    pub ga4: ChannelStatus,
    pub meta: ChannelStatus,
}

impl ChannelStatuses {
    pub fn get(&self, channel: Channel) -> ChannelStatus {
        match channel {
            Channel::Gtm => self.gtm,
            Channel::Ga4 => self.ga4,
            Channel::Meta => self.meta,
        }
    }

    /// Number of channels in `status`
    pub fn count(&self, status: ChannelStatus) -> u32 {
        Channel::ALL
            .iter()
            .filter(|channel| self.get(**channel) == status)
            .count() as u32
    }
}

/// Derive the per-channel status of one heartbeat
///
/// GTM is infrastructure and is only ever `active` or `missing`. GA4 and
/// Meta count as `active` only when their network call was seen; tag
/// presence alone is not enough.
pub fn compute_channels(observation: &Observation) -> ChannelStatuses {
    let gtm = if observation.gtm_present {
        ChannelStatus::Active
    } else {
        ChannelStatus::Missing
    };

    ChannelStatuses {
        gtm,
        ga4: firing_status(observation.ga4_collect_seen, observation.consent_granted),
        meta: firing_status(observation.meta_tr_seen, observation.consent_granted),
    }
}

fn firing_status(call_seen: bool, consent_granted: Option<bool>) -> ChannelStatus {
    if call_seen {
        ChannelStatus::Active
    } else if consent_granted == Some(false) {
        ChannelStatus::Blocked
    } else {
        ChannelStatus::Missing
    }
}

/// Derive overall status and issue count from the channel statuses
///
/// Missing channels take strict precedence: when any channel is missing the
/// issue count covers missing channels only, and blocked channels are not
/// added to it.
pub fn compute_overall(channels: &ChannelStatuses) -> (OverallStatus, u32) {
    let missing = channels.count(ChannelStatus::Missing);
    if missing > 0 {
        let overall = if missing >= 2 {
            OverallStatus::Critical
        } else {
            OverallStatus::Degraded
        };
        return (overall, missing);
    }

    let blocked = channels.count(ChannelStatus::Blocked);
    if blocked > 0 {
        return (OverallStatus::Degraded, blocked);
    }

    (OverallStatus::Healthy, 0)
}

/// Everything one heartbeat contributes to its site's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub channels: ChannelStatuses,
    pub overall: OverallStatus,
    pub issue_count: u32,
    pub ids: ChannelIds,
    pub observed_at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Evaluate an observation received at `observed_at`
    pub fn from_observation(observation: &Observation, observed_at: DateTime<Utc>) -> Self {
        let channels = compute_channels(observation);
        let (overall, issue_count) = compute_overall(&channels);
        Self {
            channels,
            overall,
            issue_count,
            ids: observation.ids(),
            observed_at,
        }
    }

    /// The value a channel's last-seen column takes for this update, if any
    pub fn last_seen_for(&self, channel: Channel) -> Option<DateTime<Utc>> {
        (self.channels.get(channel) == ChannelStatus::Active).then_some(self.observed_at)
    }
}

/// Fold an update into the previous status
pub fn merge(previous: &SiteStatus, update: &StatusUpdate) -> SiteStatus {
    SiteStatus {
        site_id: previous.site_id,
        gtm: merge_channel(&previous.gtm, update.channels.gtm, &update.ids.gtm, update.observed_at),
        ga4: merge_channel(&previous.ga4, update.channels.ga4, &update.ids.ga4, update.observed_at),
        meta: merge_channel(
            &previous.meta,
            update.channels.meta,
            &update.ids.meta,
            update.observed_at,
        ),
        overall: Some(update.overall),
        issue_count: update.issue_count,
        total_heartbeats: previous.total_heartbeats + 1,
        last_heartbeat_at: Some(update.observed_at),
    }
}

fn merge_channel(
    previous: &ChannelState,
    status: ChannelStatus,
    id: &Option<String>,
    now: DateTime<Utc>,
) -> ChannelState {
    let last_seen = if status == ChannelStatus::Active {
        // Concurrent writers may commit out of clock order; keep the later one.
        Some(previous.last_seen.map_or(now, |seen| seen.max(now)))
    } else {
        previous.last_seen
    };

    ChannelState {
        status: Some(status),
        last_seen,
        last_id: id.clone().or_else(|| previous.last_id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn statuses(gtm: ChannelStatus, ga4: ChannelStatus, meta: ChannelStatus) -> ChannelStatuses {
        ChannelStatuses { gtm, ga4, meta }
    }

    use ChannelStatus::{Active, Blocked, Missing};

    #[test]
    fn test_gtm_is_never_blocked() {
        for consent in [None, Some(true), Some(false)] {
            let obs = Observation {
                gtm_present: false,
                consent_granted: consent,
                ..Default::default()
            };
            assert_eq!(compute_channels(&obs).gtm, Missing);

            let obs = Observation {
                gtm_present: true,
                consent_granted: consent,
                ..Default::default()
            };
            assert_eq!(compute_channels(&obs).gtm, Active);
        }
    }

    #[test]
    fn test_ga4_requires_collect_call() {
        let tag_only = Observation {
            ga4_present: true,
            ga4_tag_present: true,
            ga4_collect_seen: false,
            ..Default::default()
        };
        assert_eq!(compute_channels(&tag_only).ga4, Missing);

        let collected = Observation {
            ga4_tag_present: false,
            ga4_collect_seen: true,
            consent_granted: Some(false),
            ..Default::default()
        };
        assert_eq!(compute_channels(&collected).ga4, Active);
    }

    #[test]
    fn test_blocked_only_on_explicit_denial() {
        let denied = Observation {
            consent_granted: Some(false),
            ..Default::default()
        };
        let channels = compute_channels(&denied);
        assert_eq!(channels.ga4, Blocked);
        assert_eq!(channels.meta, Blocked);

        let unknown = Observation::default();
        let channels = compute_channels(&unknown);
        assert_eq!(channels.ga4, Missing);
        assert_eq!(channels.meta, Missing);

        let granted = Observation {
            consent_granted: Some(true),
            ..Default::default()
        };
        assert_eq!(compute_channels(&granted).meta, Missing);
    }

    #[test]
    fn test_meta_uses_tr_call() {
        let obs = Observation {
            meta_pixel_present: true,
            meta_tr_seen: true,
            ..Default::default()
        };
        let channels = compute_channels(&obs);
        assert_eq!(channels.meta, Active);
        assert_eq!(channels.ga4, Missing);
    }

    #[test]
    fn test_overall_all_active_is_healthy() {
        assert_eq!(
            compute_overall(&statuses(Active, Active, Active)),
            (OverallStatus::Healthy, 0)
        );
    }

    #[test]
    fn test_overall_missing_counts() {
        assert_eq!(
            compute_overall(&statuses(Missing, Active, Active)),
            (OverallStatus::Degraded, 1)
        );
        assert_eq!(
            compute_overall(&statuses(Missing, Missing, Active)),
            (OverallStatus::Critical, 2)
        );
        assert_eq!(
            compute_overall(&statuses(Missing, Missing, Missing)),
            (OverallStatus::Critical, 3)
        );
    }

    #[test]
    fn test_overall_blocked_counts() {
        assert_eq!(
            compute_overall(&statuses(Active, Blocked, Active)),
            (OverallStatus::Degraded, 1)
        );
        assert_eq!(
            compute_overall(&statuses(Active, Blocked, Blocked)),
            (OverallStatus::Degraded, 2)
        );
    }

    #[test]
    fn test_missing_precedes_blocked_without_combining() {
        // One missing plus two blocked: degraded, and only the missing one counts.
        assert_eq!(
            compute_overall(&statuses(Missing, Blocked, Blocked)),
            (OverallStatus::Degraded, 1)
        );
        assert_eq!(
            compute_overall(&statuses(Active, Missing, Blocked)),
            (OverallStatus::Degraded, 1)
        );
        assert_eq!(
            compute_overall(&statuses(Missing, Missing, Blocked)),
            (OverallStatus::Critical, 2)
        );
    }

    #[test]
    fn test_overall_matches_property_over_all_combinations() {
        let all = [Active, Missing, Blocked];
        for gtm in all {
            for ga4 in all {
                for meta in all {
                    let channels = statuses(gtm, ga4, meta);
                    let missing = channels.count(Missing);
                    let blocked = channels.count(Blocked);
                    let (overall, _) = compute_overall(&channels);
                    let expected = if missing >= 2 {
                        OverallStatus::Critical
                    } else if missing == 1 || blocked > 0 {
                        OverallStatus::Degraded
                    } else {
                        OverallStatus::Healthy
                    };
                    assert_eq!(overall, expected, "{:?}", channels);
                }
            }
        }
    }

    #[test]
    fn test_merge_first_heartbeat_scenario() {
        let obs = Observation {
            gtm_present: true,
            ga4_collect_seen: false,
            meta_tr_seen: false,
            consent_granted: Some(false),
            ..Default::default()
        };
        let update = StatusUpdate::from_observation(&obs, at(0));
        let status = merge(&SiteStatus::seeded(1), &update);

        assert_eq!(status.gtm.status, Some(Active));
        assert_eq!(status.ga4.status, Some(Blocked));
        assert_eq!(status.meta.status, Some(Blocked));
        assert_eq!(status.overall, Some(OverallStatus::Degraded));
        assert_eq!(status.issue_count, 2);
        assert_eq!(status.gtm.last_seen, Some(at(0)));
        assert_eq!(status.ga4.last_seen, None);
        assert_eq!(status.total_heartbeats, 1);
        assert_eq!(status.last_heartbeat_at, Some(at(0)));
    }

    #[test]
    fn test_merge_keeps_last_seen_when_not_active() {
        let first = StatusUpdate::from_observation(
            &Observation {
                gtm_present: true,
                ..Default::default()
            },
            at(0),
        );
        let second = StatusUpdate::from_observation(
            &Observation {
                gtm_present: false,
                ga4_collect_seen: true,
                meta_tr_seen: true,
                ..Default::default()
            },
            at(60),
        );

        let status = merge(&merge(&SiteStatus::seeded(1), &first), &second);
        assert_eq!(status.gtm.status, Some(Missing));
        assert_eq!(status.gtm.last_seen, Some(at(0)));
        assert_eq!(status.ga4.last_seen, Some(at(60)));
        assert_eq!(status.meta.last_seen, Some(at(60)));
        assert_eq!(status.overall, Some(OverallStatus::Degraded));
        assert_eq!(status.issue_count, 1);
        assert_eq!(status.total_heartbeats, 2);
    }

    #[test]
    fn test_merge_gtm_never_active_stays_unset() {
        let update = StatusUpdate::from_observation(
            &Observation {
                gtm_present: false,
                ga4_collect_seen: true,
                meta_tr_seen: true,
                ..Default::default()
            },
            at(60),
        );

        let status = merge(&SiteStatus::seeded(1), &update);
        assert_eq!(status.gtm.status, Some(Missing));
        assert_eq!(status.gtm.last_seen, None);
        assert_eq!(status.ga4.last_seen, Some(at(60)));
        assert_eq!(status.issue_count, 1);
    }

    #[test]
    fn test_merge_last_seen_never_moves_backwards() {
        let active = Observation {
            gtm_present: true,
            ..Default::default()
        };
        let later = merge(
            &SiteStatus::seeded(1),
            &StatusUpdate::from_observation(&active, at(100)),
        );
        let earlier = merge(&later, &StatusUpdate::from_observation(&active, at(50)));
        assert_eq!(earlier.gtm.last_seen, Some(at(100)));
    }

    #[test]
    fn test_merge_keeps_known_ids() {
        let with_ids = Observation {
            gtm_container_id: Some("GTM-1".to_string()),
            meta_pixel_id: Some("123".to_string()),
            ..Default::default()
        };
        let without_ids = Observation::default();
        let changed = Observation {
            gtm_container_id: Some("GTM-2".to_string()),
            ..Default::default()
        };

        let s1 = merge(
            &SiteStatus::seeded(1),
            &StatusUpdate::from_observation(&with_ids, at(0)),
        );
        let s2 = merge(&s1, &StatusUpdate::from_observation(&without_ids, at(1)));
        assert_eq!(s2.gtm.last_id.as_deref(), Some("GTM-1"));
        assert_eq!(s2.meta.last_id.as_deref(), Some("123"));
        assert_eq!(s2.ga4.last_id, None);

        let s3 = merge(&s2, &StatusUpdate::from_observation(&changed, at(2)));
        assert_eq!(s3.gtm.last_id.as_deref(), Some("GTM-2"));
        assert_eq!(s3.meta.last_id.as_deref(), Some("123"));
    }

    #[test]
    fn test_last_seen_for_only_active_channels() {
        let update = StatusUpdate::from_observation(
            &Observation {
                ga4_collect_seen: true,
                ..Default::default()
            },
            at(5),
        );
        assert_eq!(update.last_seen_for(Channel::Ga4), Some(at(5)));
        assert_eq!(update.last_seen_for(Channel::Gtm), None);
        assert_eq!(update.last_seen_for(Channel::Meta), None);
    }
}
