//! Dispatch coordinator: one invocation of the reminder/summary pipeline.
//!
//! resolve → match → progress → render → deliver, per recipient and kind.
//! Every attempt is isolated: errors and panics become a `DispatchResult`
//! for that attempt only. Invocation-level failures (the store) abort.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use jobtrail_channels::DeliveryAdapter;
use jobtrail_core::config::{DispatchConfig, JobtrailConfig};
use jobtrail_core::error::{JobtrailError, Result};
use jobtrail_core::traits::RecipientStore;
use jobtrail_core::types::{DispatchResult, MessageKind};
use serde::Serialize;

use crate::clock::{ReferenceClock, Tick, is_due};
use crate::progress::compute_progress;
use crate::resolver::{Eligibility, EligibleRecipient, RecipientResolver, SkipCounts};
use crate::template::{TemplateVars, render_message};

/// Reason recorded when the per-day ledger already holds the send key.
pub const ALREADY_SENT: &str = "already sent today";

/// How an invocation was started.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Periodic trigger: time matching applies.
    Scheduled,
    /// Operator-forced: both kinds for one recipient, no time matching.
    Manual,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

/// What one invocation did. This is also the trigger endpoint's response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationReport {
    pub id: String,
    pub success: bool,
    pub mode: DispatchMode,
    /// RFC 3339, reference clock.
    pub timestamp: String,
    /// `HH:MM` the schedules were matched against.
    pub current_time: String,
    pub today: String,
    pub recipients_checked: usize,
    pub recipients_eligible: usize,
    /// Eligible recipients with at least one kind due.
    pub recipients_due: usize,
    pub skipped: SkipCounts,
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<DispatchResult>,
}

/// One planned send: the recipient plus which kind, and the time that matched.
struct Attempt<'a> {
    target: &'a EligibleRecipient,
    kind: MessageKind,
    scheduled_time: String,
}

pub struct Dispatcher {
    pub(crate) store: Arc<dyn RecipientStore>,
    pub(crate) delivery: DeliveryAdapter,
    pub(crate) clock: ReferenceClock,
    pub(crate) resolver: RecipientResolver,
    concurrency: usize,
    dedupe_per_day: bool,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn RecipientStore>,
        delivery: DeliveryAdapter,
        config: &JobtrailConfig,
    ) -> Result<Self> {
        let clock = ReferenceClock::new(config.clock.offset()?);
        Ok(Self::with_clock(store, delivery, clock, &config.dispatch))
    }

    pub fn with_clock(
        store: Arc<dyn RecipientStore>,
        delivery: DeliveryAdapter,
        clock: ReferenceClock,
        config: &DispatchConfig,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            resolver: RecipientResolver::new(store.clone(), concurrency),
            store,
            delivery,
            clock,
            concurrency,
            dedupe_per_day: config.dedupe_per_day,
        }
    }

    pub fn clock(&self) -> &ReferenceClock {
        &self.clock
    }

    /// Scheduled invocation: every enabled recipient, time-matched at `now`.
    pub async fn run_invocation(&self, now: DateTime<Utc>) -> Result<InvocationReport> {
        let tick = self.clock.tick(now);
        let resolution = match self.resolver.resolve_eligible(&tick).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("❌ Dispatch at {} aborted: {e}", tick.hhmm);
                return Err(e);
            }
        };

        let due: Vec<Vec<Attempt<'_>>> = resolution
            .eligible
            .iter()
            .map(|target| due_attempts(target, &tick))
            .filter(|attempts| !attempts.is_empty())
            .collect();
        let recipients_due = due.len();

        // One chain per recipient; chains run concurrently, kinds within a
        // chain run in order. Collect the futures first: a stream closure
        // over `Attempt<'_>` does not satisfy `Send` under `tokio::spawn`.
        let chains: Vec<_> = due
            .into_iter()
            .map(|attempts| self.run_chain(attempts, &tick, self.dedupe_per_day))
            .collect();
        let results: Vec<DispatchResult> = stream::iter(chains)
            .buffer_unordered(self.concurrency)
            .flat_map(stream::iter)
            .collect()
            .await;

        let report = finish(
            DispatchMode::Scheduled,
            &tick,
            resolution.checked,
            resolution.eligible.len(),
            recipients_due,
            resolution.skipped,
            results,
        );
        log_summary(&report);
        Ok(report)
    }

    /// Force both kinds for one recipient, found by id or email.
    ///
    /// Skips the notification flag and time matching but keeps the schedule
    /// and today's-target preconditions. Never claims the per-day ledger, so
    /// a manual send neither consumes nor is blocked by the scheduled slot.
    pub async fn run_manual(&self, identifier: &str, now: DateTime<Utc>) -> Result<InvocationReport> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(JobtrailError::InvalidInput("recipient identifier is required".into()));
        }
        let tick = self.clock.tick(now);
        let recipient = self
            .store
            .find_recipient(identifier)
            .await?
            .ok_or_else(|| JobtrailError::NotFound(format!("recipient '{identifier}'")))?;

        let target = match self.resolver.evaluate(recipient, &tick).await? {
            Eligibility::Eligible(target) => *target,
            Eligibility::Skipped(reason) => {
                tracing::info!("⏭️ Manual dispatch for {identifier} refused: {}", reason.describe());
                return Err(JobtrailError::Ineligible(format!(
                    "recipient '{identifier}' has {}",
                    reason.describe()
                )));
            }
        };

        let attempts = MessageKind::ALL
            .iter()
            .map(|&kind| Attempt {
                target: &target,
                kind,
                scheduled_time: target.schedule.time_for(kind).unwrap_or_default().to_string(),
            })
            .collect();
        let results = self.run_chain(attempts, &tick, false).await;

        let report = finish(DispatchMode::Manual, &tick, 1, 1, 1, SkipCounts::default(), results);
        log_summary(&report);
        Ok(report)
    }

    async fn run_chain(&self, attempts: Vec<Attempt<'_>>, tick: &Tick, claim: bool) -> Vec<DispatchResult> {
        let mut results = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            results.push(self.run_attempt(attempt, tick, claim).await);
        }
        results
    }

    /// Run one attempt and capture its outcome, whatever happens.
    async fn run_attempt(&self, attempt: Attempt<'_>, tick: &Tick, claim: bool) -> DispatchResult {
        let recipient = &attempt.target.recipient;
        let outcome = AssertUnwindSafe(self.send_one(attempt.target, attempt.kind, tick, claim))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => Some(ALREADY_SENT.to_string()),
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("attempt panicked: {}", panic_message(panic.as_ref()))),
        };
        match &error {
            None => tracing::info!("✅ {} sent to {}", attempt.kind, recipient.email),
            Some(reason) => {
                tracing::warn!("⚠️ {} to {} not sent: {reason}", attempt.kind, recipient.email)
            }
        }

        DispatchResult {
            recipient: recipient.email.clone(),
            recipient_id: recipient.id.clone(),
            kind: attempt.kind,
            sent: error.is_none(),
            scheduled_time: attempt.scheduled_time,
            current_time: tick.hhmm.clone(),
            error,
        }
    }

    /// `Ok(false)` means the per-day ledger already held this send.
    async fn send_one(
        &self,
        target: &EligibleRecipient,
        kind: MessageKind,
        tick: &Tick,
        claim: bool,
    ) -> Result<bool> {
        let progress = compute_progress(target.activity_count_today, target.daily_target.target)?;
        let vars = TemplateVars::new(target.daily_target.target, target.activity_count_today, &progress);
        let footer = tick.at.format("%Y-%m-%d %H:%M %:z").to_string();
        let body = render_message(kind, target.schedule.template_for(kind), &vars, &footer);

        if claim
            && !self.store.claim_send(&target.recipient.id, kind, &tick.date).await?
        {
            return Ok(false);
        }

        self.delivery
            .try_deliver(&target.recipient.email, &body.subject, &body.html)
            .await?;
        Ok(true)
    }
}

/// Kinds whose trigger time equals the tick's minute.
fn due_attempts<'a>(target: &'a EligibleRecipient, tick: &Tick) -> Vec<Attempt<'a>> {
    MessageKind::ALL
        .iter()
        .filter_map(|&kind| {
            let time = target.schedule.time_for(kind)?;
            is_due(time, &tick.hhmm).then(|| Attempt {
                target,
                kind,
                scheduled_time: time.to_string(),
            })
        })
        .collect()
}

fn finish(
    mode: DispatchMode,
    tick: &Tick,
    checked: usize,
    eligible: usize,
    due: usize,
    skipped: SkipCounts,
    mut results: Vec<DispatchResult>,
) -> InvocationReport {
    results.sort_by(|a, b| {
        a.recipient
            .cmp(&b.recipient)
            .then_with(|| a.recipient_id.cmp(&b.recipient_id))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    let sent = results.iter().filter(|r| r.sent).count();
    InvocationReport {
        id: uuid::Uuid::new_v4().to_string(),
        success: true,
        mode,
        timestamp: tick.at.to_rfc3339(),
        current_time: tick.hhmm.clone(),
        today: tick.date.clone(),
        recipients_checked: checked,
        recipients_eligible: eligible,
        recipients_due: due,
        skipped,
        sent,
        failed: results.len() - sent,
        results,
    }
}

fn log_summary(report: &InvocationReport) {
    tracing::info!(
        "📬 Dispatch [{}] {} {}: checked {}, eligible {}, skipped {} (no schedule {}, no target {}), sent {}, failed {}",
        report.mode.as_str(),
        report.today,
        report.current_time,
        report.recipients_checked,
        report.recipients_eligible,
        report.skipped.total(),
        report.skipped.missing_schedule,
        report.skipped.missing_target,
        report.sent,
        report.failed,
    );
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
