//! In-process periodic trigger.
//!
//! Fires once per wall-clock minute and spawns an independent invocation per
//! tick. Late ticks are skipped rather than replayed, and overlapping
//! invocations are not serialized.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobtrail_core::error::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::until_next_minute;
use crate::dispatch::{DispatchMode, Dispatcher, InvocationReport};
use crate::history::DispatchHistory;

/// Trigger interval.
pub const TICK_PERIOD: Duration = Duration::from_secs(60);

/// Slack past the minute boundary so a slightly early wakeup never lands in
/// the previous minute.
const BOUNDARY_SLACK: Duration = Duration::from_secs(1);

/// Run a scheduled invocation and record the outcome in `history`.
pub async fn run_and_record(
    dispatcher: &Dispatcher,
    history: &Mutex<DispatchHistory>,
    now: DateTime<Utc>,
) -> Result<InvocationReport> {
    let outcome = dispatcher.run_invocation(now).await;
    let mut h = history.lock().await;
    match &outcome {
        Ok(report) => h.record(report),
        Err(e) => h.record_failure(DispatchMode::Scheduled, e),
    }
    outcome
}

/// Manual counterpart of [`run_and_record`]. Client errors (unknown or
/// ineligible recipient) are not recorded.
pub async fn run_manual_and_record(
    dispatcher: &Dispatcher,
    history: &Mutex<DispatchHistory>,
    identifier: &str,
    now: DateTime<Utc>,
) -> Result<InvocationReport> {
    let outcome = dispatcher.run_manual(identifier, now).await;
    match &outcome {
        Ok(report) => history.lock().await.record(report),
        Err(e) if !e.is_client_error() => {
            history.lock().await.record_failure(DispatchMode::Manual, e)
        }
        Err(_) => {}
    }
    outcome
}

/// Start the minute ticker, aligned to the next minute boundary.
pub fn spawn_ticker(dispatcher: Arc<Dispatcher>, history: Arc<Mutex<DispatchHistory>>) -> JoinHandle<()> {
    let first = until_next_minute(Utc::now()) + BOUNDARY_SLACK;
    tracing::info!("⏰ Dispatch ticker starts in {}s (every {}s)", first.as_secs(), TICK_PERIOD.as_secs());
    spawn_ticker_at(dispatcher, history, first, TICK_PERIOD)
}

/// Start a ticker whose first tick fires after `first`, then every `period`.
pub fn spawn_ticker_at(
    dispatcher: Arc<Dispatcher>,
    history: Arc<Mutex<DispatchHistory>>,
    first: Duration,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + first, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let now = Utc::now();
            let dispatcher = dispatcher.clone();
            let history = history.clone();
            // Each tick runs on its own; a slow invocation never delays the next.
            tokio::spawn(async move {
                if let Err(e) = run_and_record(&dispatcher, &history, now).await {
                    tracing::error!("❌ Scheduled dispatch failed: {e}");
                }
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ReferenceClock;
    use crate::store::{JsonStore, Snapshot};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use jobtrail_channels::DeliveryAdapter;
    use jobtrail_core::config::DispatchConfig;
    use jobtrail_core::error::JobtrailError;
    use jobtrail_core::traits::RecipientStore;
    use jobtrail_core::types::{ActivityStamp, DailyTarget, MessageKind, Recipient, Schedule};

    struct DownStore;

    #[async_trait]
    impl RecipientStore for DownStore {
        async fn list_enabled_recipients(&self) -> Result<Vec<Recipient>> {
            Err(JobtrailError::Store("unreachable".into()))
        }
        async fn find_recipient(&self, _: &str) -> Result<Option<Recipient>> {
            Ok(None)
        }
        async fn schedule_for(&self, _: &str) -> Result<Option<Schedule>> {
            Ok(None)
        }
        async fn daily_target_for(&self, _: &str, _: &str) -> Result<Option<DailyTarget>> {
            Ok(None)
        }
        async fn activity_stamps(&self, _: &str) -> Result<Vec<ActivityStamp>> {
            Ok(vec![])
        }
        async fn claim_send(&self, _: &str, _: MessageKind, _: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn dispatcher(store: Arc<dyn RecipientStore>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::with_clock(
            store,
            DeliveryAdapter::unconfigured(),
            ReferenceClock::utc(),
            &DispatchConfig::default(),
        ))
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 22, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_run_and_record_success_and_failure() {
        let history = Mutex::new(DispatchHistory::new(10));

        let ok = dispatcher(Arc::new(JsonStore::from_snapshot(Snapshot::default())));
        assert!(run_and_record(&ok, &history, noon()).await.is_ok());

        let down = dispatcher(Arc::new(DownStore));
        assert!(run_and_record(&down, &history, noon()).await.is_err());

        let entries = history.lock().await.recent();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].error.is_some());
        assert!(entries[1].report.is_some());
    }

    #[tokio::test]
    async fn test_manual_client_errors_not_recorded() {
        let history = Mutex::new(DispatchHistory::new(10));
        let d = dispatcher(Arc::new(JsonStore::from_snapshot(Snapshot::default())));
        let err = run_manual_and_record(&d, &history, "nobody", noon()).await.unwrap_err();
        assert!(matches!(err, JobtrailError::NotFound(_)));
        assert!(history.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_ticker_fires_repeatedly() {
        let history = Arc::new(Mutex::new(DispatchHistory::new(100)));
        let d = dispatcher(Arc::new(JsonStore::from_snapshot(Snapshot::default())));
        let handle = spawn_ticker_at(d, history.clone(), Duration::ZERO, Duration::from_millis(40));

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(history.lock().await.len() >= 2);
    }
}
