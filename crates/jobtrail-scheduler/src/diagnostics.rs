//! "Why didn't I get an email?": a read-only precondition report.
//!
//! Walks the same checks a dispatch would, for one recipient, without
//! claiming any send key or touching the transport.

use chrono::{DateTime, Utc};
use jobtrail_core::error::{JobtrailError, Result};
use jobtrail_core::types::MessageKind;
use serde::Serialize;

use crate::clock::{is_due, is_normalized};
use crate::dispatch::Dispatcher;

/// Per-kind view of one trigger time.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KindStatus {
    pub kind: MessageKind,
    pub scheduled_time: Option<String>,
    /// Stored exactly as `HH:MM`; anything else can never match.
    pub time_normalized: bool,
    /// A scheduled invocation at this minute would send this kind.
    pub would_send_now: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub identifier: String,
    pub current_time: String,
    pub today: String,
    pub transport_configured: bool,
    pub recipient_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub notifications_enabled: bool,
    pub schedule_exists: bool,
    pub reminder_time_set: bool,
    pub summary_time_set: bool,
    pub times_normalized: bool,
    pub target_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_target: Option<u32>,
    pub activities_today: u32,
    pub kinds: Vec<KindStatus>,
    pub issues: Vec<String>,
}

impl DiagnosticReport {
    /// Every precondition holds.
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Dispatcher {
    /// Report each dispatch precondition for one recipient, by id or email.
    pub async fn diagnose(&self, identifier: &str, now: DateTime<Utc>) -> Result<DiagnosticReport> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(JobtrailError::InvalidInput("recipient identifier is required".into()));
        }
        let tick = self.clock.tick(now);
        let mut report = DiagnosticReport {
            identifier: identifier.to_string(),
            current_time: tick.hhmm.clone(),
            today: tick.date.clone(),
            transport_configured: self.delivery.is_configured(),
            recipient_exists: false,
            recipient_id: None,
            notifications_enabled: false,
            schedule_exists: false,
            reminder_time_set: false,
            summary_time_set: false,
            times_normalized: false,
            target_exists: false,
            daily_target: None,
            activities_today: 0,
            kinds: Vec::new(),
            issues: Vec::new(),
        };
        if !report.transport_configured {
            report.issues.push("Email transport is not configured".into());
        }

        let Some(recipient) = self.store.find_recipient(identifier).await? else {
            report.issues.push(format!("No recipient matches '{identifier}'"));
            return Ok(report);
        };
        report.recipient_exists = true;
        report.recipient_id = Some(recipient.id.clone());
        report.notifications_enabled = recipient.notifications_enabled;
        if !recipient.notifications_enabled {
            report.issues.push("Notifications are disabled for this recipient".into());
        }

        let schedule = self.store.schedule_for(&recipient.id).await?;
        let target = self
            .store
            .daily_target_for(&recipient.id, &tick.date)
            .await?
            .filter(|t| t.target > 0);
        report.target_exists = target.is_some();
        report.daily_target = target.as_ref().map(|t| t.target);
        if target.is_none() {
            report.issues.push(format!("No daily target set for {}", tick.date));
        }
        report.activities_today = self.resolver.count_activities_today(&recipient.id, &tick).await?;

        let Some(schedule) = schedule else {
            report.issues.push("No notification schedule".into());
            return Ok(report);
        };
        report.schedule_exists = true;
        report.reminder_time_set = schedule.reminder_time.is_some();
        report.summary_time_set = schedule.summary_time.is_some();

        let eligible = recipient.notifications_enabled && report.target_exists;
        for kind in MessageKind::ALL {
            let time = schedule.time_for(kind);
            let normalized = time.is_some_and(is_normalized);
            match time {
                None => report.issues.push(format!("No {kind} time set")),
                Some(t) if !normalized => report
                    .issues
                    .push(format!("{kind} time '{t}' is not in HH:MM form and will never match")),
                Some(_) => {}
            }
            report.kinds.push(KindStatus {
                kind,
                scheduled_time: time.map(str::to_string),
                time_normalized: normalized,
                would_send_now: eligible
                    && report.transport_configured
                    && time.is_some_and(|t| is_due(t, &tick.hhmm)),
            });
        }
        report.times_normalized = report.kinds.iter().all(|k| k.time_normalized);
        Ok(report)
    }
}
