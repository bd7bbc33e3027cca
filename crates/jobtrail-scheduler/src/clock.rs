//! Reference clock and trigger-time matching.
//!
//! All schedules are compared in one reference zone at minute resolution.
//! A trigger minute that is never evaluated (delayed or skipped tick) is
//! missed for the day; nothing here catches up.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Timelike, Utc};

/// The reference clock: UTC shifted by one fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceClock {
    offset: FixedOffset,
}

/// One invocation's view of "now", derived once and shared by every recipient.
#[derive(Debug, Clone)]
pub struct Tick {
    pub at: DateTime<FixedOffset>,
    /// Zero-padded `HH:MM`.
    pub hhmm: String,
    /// `YYYY-MM-DD`.
    pub date: String,
}

impl ReferenceClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn tick(&self, now: DateTime<Utc>) -> Tick {
        let at = now.with_timezone(&self.offset);
        Tick {
            hhmm: at.format("%H:%M").to_string(),
            date: at.format("%Y-%m-%d").to_string(),
            at,
        }
    }

    /// The instant today (in the reference zone) at which the clock reads `hhmm`.
    pub fn today_at(&self, now: DateTime<Utc>, hhmm: &str) -> Option<DateTime<Utc>> {
        let time = NaiveTime::parse_from_str(&normalize_hhmm(hhmm)?, "%H:%M").ok()?;
        let local = now.with_timezone(&self.offset).date_naive().and_time(time);
        self.offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl Default for ReferenceClock {
    fn default() -> Self {
        Self::utc()
    }
}

/// Exact minute match. No normalization, no tolerance window.
pub fn is_due(scheduled: &str, now_hhmm: &str) -> bool {
    scheduled == now_hhmm
}

/// Parse a loosely written `H:M` time into zero-padded `HH:MM`.
///
/// Used for validation and diagnostics only; matching never normalizes.
pub fn normalize_hhmm(raw: &str) -> Option<String> {
    let (h, m) = raw.trim().split_once(':')?;
    if h.is_empty() || m.is_empty() || h.len() > 2 || m.len() > 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(format!("{h:02}:{m:02}"))
}

/// Whether a stored time is already in the exact form the matcher compares.
pub fn is_normalized(raw: &str) -> bool {
    normalize_hhmm(raw).is_some_and(|n| n == raw)
}

/// Time left until the start of the next wall-clock minute.
pub fn until_next_minute(now: DateTime<Utc>) -> std::time::Duration {
    let floor = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let next = floor + Duration::minutes(1);
    (next - now).to_std().unwrap_or_default()
}
