//! Recipient resolution: who is eligible for a message in this invocation.
//!
//! A recipient needs notifications enabled, a schedule, and a positive target
//! for today's reference-clock date. Missing pieces exclude the recipient
//! silently; they are only counted. Any store error aborts the whole pass.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use jobtrail_core::error::Result;
use jobtrail_core::traits::RecipientStore;
use jobtrail_core::types::{ActivityStamp, DailyTarget, Recipient, Schedule};
use serde::Serialize;

use crate::clock::Tick;

/// Everything needed to match, render and deliver for one recipient.
#[derive(Debug, Clone)]
pub struct EligibleRecipient {
    pub recipient: Recipient,
    pub schedule: Schedule,
    pub daily_target: DailyTarget,
    pub activity_count_today: u32,
}

/// Why a recipient was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingSchedule,
    MissingTarget,
}

impl SkipReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::MissingSchedule => "no notification schedule",
            Self::MissingTarget => "no daily target for today",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Eligibility {
    Eligible(Box<EligibleRecipient>),
    Skipped(SkipReason),
}

/// Aggregate skip counts for operator diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipCounts {
    pub missing_schedule: usize,
    pub missing_target: usize,
}

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::MissingSchedule => self.missing_schedule += 1,
            SkipReason::MissingTarget => self.missing_target += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_schedule + self.missing_target
    }
}

/// Result of one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Enabled recipients enumerated.
    pub checked: usize,
    pub eligible: Vec<EligibleRecipient>,
    pub skipped: SkipCounts,
}

pub struct RecipientResolver {
    store: Arc<dyn RecipientStore>,
    concurrency: usize,
}

impl RecipientResolver {
    pub fn new(store: Arc<dyn RecipientStore>, concurrency: usize) -> Self {
        Self { store, concurrency: concurrency.max(1) }
    }

    /// Resolve every enabled recipient for `tick`'s date.
    pub async fn resolve_eligible(&self, tick: &Tick) -> Result<Resolution> {
        let recipients = self.store.list_enabled_recipients().await?;
        let checked = recipients.len();

        let outcomes: Vec<Eligibility> = stream::iter(recipients)
            .map(|r| self.evaluate(r, tick))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut resolution = Resolution { checked, ..Default::default() };
        for outcome in outcomes {
            match outcome {
                Eligibility::Eligible(e) => resolution.eligible.push(*e),
                Eligibility::Skipped(reason) => resolution.skipped.record(reason),
            }
        }
        Ok(resolution)
    }

    /// Check one recipient's preconditions. Ignores the notification flag;
    /// enumeration already filtered on it.
    pub async fn evaluate(&self, recipient: Recipient, tick: &Tick) -> Result<Eligibility> {
        let Some(schedule) = self.store.schedule_for(&recipient.id).await? else {
            tracing::debug!("⏭️ {} skipped: no schedule", recipient.id);
            return Ok(Eligibility::Skipped(SkipReason::MissingSchedule));
        };
        let target = self.store.daily_target_for(&recipient.id, &tick.date).await?;
        let Some(daily_target) = target.filter(|t| t.target > 0) else {
            tracing::debug!("⏭️ {} skipped: no target for {}", recipient.id, tick.date);
            return Ok(Eligibility::Skipped(SkipReason::MissingTarget));
        };
        let activity_count_today = self.count_activities_today(&recipient.id, tick).await?;
        Ok(Eligibility::Eligible(Box::new(EligibleRecipient {
            recipient,
            schedule,
            daily_target,
            activity_count_today,
        })))
    }

    /// Count activity records whose normalized date equals today's.
    pub async fn count_activities_today(&self, recipient_id: &str, tick: &Tick) -> Result<u32> {
        let stamps = self.store.activity_stamps(recipient_id).await?;
        let today = tick.at.date_naive();
        let offset = *tick.at.offset();
        let mut count = 0u32;
        let mut unparsed = 0usize;
        for stamp in &stamps {
            match normalize_stamp(stamp, offset) {
                Some(date) if date == today => count += 1,
                Some(_) => {}
                None => unparsed += 1,
            }
        }
        if unparsed > 0 {
            tracing::debug!("🔎 {recipient_id}: {unparsed} activity stamp(s) not parseable");
        }
        Ok(count)
    }
}

/// Epoch values above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Normalize any stored stamp to a reference-clock calendar date.
///
/// Zoned values (RFC 3339, epoch) are converted into the reference zone;
/// naive values are taken to already be reference-clock time.
pub fn normalize_stamp(stamp: &ActivityStamp, offset: FixedOffset) -> Option<NaiveDate> {
    match stamp {
        ActivityStamp::Epoch(n) => epoch_to_date(*n, offset),
        ActivityStamp::Text(raw) => {
            let s = raw.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                return epoch_to_date(s.parse().ok()?, offset);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&offset).date_naive());
            }
            for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(naive.date());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
        }
    }
}

fn epoch_to_date(n: i64, offset: FixedOffset) -> Option<NaiveDate> {
    let utc = if n.abs() >= EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(n).single()?
    } else {
        Utc.timestamp_opt(n, 0).single()?
    };
    Some(utc.with_timezone(&offset).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ReferenceClock;
    use crate::store::{ActivityRecord, JsonStore, Snapshot};

    fn recipient(id: &str, enabled: bool) -> Recipient {
        Recipient {
            id: id.into(),
            email: format!("{id}@example.com"),
            display_name: None,
            notifications_enabled: enabled,
        }
    }

    fn schedule(id: &str) -> Schedule {
        Schedule {
            recipient_id: id.into(),
            reminder_time: Some("09:00".into()),
            summary_time: Some("18:00".into()),
            ..Default::default()
        }
    }

    fn target(id: &str, date: &str, target: u32) -> DailyTarget {
        DailyTarget { recipient_id: id.into(), date: date.into(), target }
    }

    fn tick() -> Tick {
        ReferenceClock::utc().tick(Utc.with_ymd_and_hms(2026, 2, 22, 9, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_resolve_counts_and_skips() {
        let snapshot = Snapshot {
            recipients: vec![
                recipient("ok", true),
                recipient("nosched", true),
                recipient("notarget", true),
                recipient("stale", true),
                recipient("zero", true),
                recipient("off", false),
            ],
            schedules: vec![schedule("ok"), schedule("notarget"), schedule("stale"), schedule("zero"), schedule("off")],
            daily_targets: vec![
                target("ok", "2026-02-22", 5),
                target("stale", "2026-02-21", 5),
                target("zero", "2026-02-22", 0),
                target("off", "2026-02-22", 5),
            ],
            activities: vec![
                ActivityRecord { recipient_id: "ok".into(), created_at: ActivityStamp::Text("2026-02-22T08:15:00Z".into()) },
                ActivityRecord { recipient_id: "ok".into(), created_at: ActivityStamp::Text("2026-02-21".into()) },
                ActivityRecord { recipient_id: "ok".into(), created_at: ActivityStamp::Text("2026-02-22".into()) },
            ],
        };
        let resolver = RecipientResolver::new(Arc::new(JsonStore::from_snapshot(snapshot)), 4);
        let res = resolver.resolve_eligible(&tick()).await.unwrap();

        assert_eq!(res.checked, 5);
        assert_eq!(res.eligible.len(), 1);
        assert_eq!(res.eligible[0].recipient.id, "ok");
        assert_eq!(res.eligible[0].activity_count_today, 2);
        assert_eq!(res.skipped, SkipCounts { missing_schedule: 1, missing_target: 3 });
        assert_eq!(res.skipped.total(), 4);
    }

    #[test]
    fn test_normalize_stamp_formats() {
        let utc = ReferenceClock::utc().offset();
        let d = NaiveDate::from_ymd_opt(2026, 2, 22).unwrap();
        let text = |s: &str| ActivityStamp::Text(s.into());

        assert_eq!(normalize_stamp(&text("2026-02-22"), utc), Some(d));
        assert_eq!(normalize_stamp(&text("2026-02-22T23:59:59Z"), utc), Some(d));
        assert_eq!(normalize_stamp(&text("2026-02-22 10:00:00"), utc), Some(d));
        assert_eq!(normalize_stamp(&text("2026-02-22T10:00:00.123"), utc), Some(d));
        assert_eq!(normalize_stamp(&text("garbage"), utc), None);
        assert_eq!(normalize_stamp(&text(""), utc), None);

        let secs = Utc.with_ymd_and_hms(2026, 2, 22, 12, 0, 0).unwrap().timestamp();
        assert_eq!(normalize_stamp(&ActivityStamp::Epoch(secs), utc), Some(d));
        assert_eq!(normalize_stamp(&ActivityStamp::Epoch(secs * 1000), utc), Some(d));
        assert_eq!(normalize_stamp(&text(&(secs * 1000).to_string()), utc), Some(d));
    }

    #[test]
    fn test_zoned_stamp_converted_to_reference_zone() {
        let plus7 = FixedOffset::east_opt(7 * 3600).unwrap();
        let stamp = ActivityStamp::Text("2026-02-22T20:00:00Z".into());
        assert_eq!(normalize_stamp(&stamp, plus7), NaiveDate::from_ymd_opt(2026, 2, 23));
    }
}
