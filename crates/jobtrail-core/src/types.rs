//! Domain types shared across the dispatcher.
//!
//! Recipients, schedules and targets are owned by the external store and are
//! read-only here. Rendered messages and dispatch results are ephemeral.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An addressable user who may receive scheduled notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    /// Opaque identity from the store.
    pub id: String,
    /// Contact address.
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub notifications_enabled: bool,
}

/// A recipient's two trigger times and optional custom templates.
///
/// Times are `HH:MM` strings in the reference clock. Read once per invocation
/// and used for both matching and rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub recipient_id: String,
    #[serde(default)]
    pub reminder_time: Option<String>,
    #[serde(default)]
    pub summary_time: Option<String>,
    #[serde(default)]
    pub reminder_template: Option<String>,
    #[serde(default)]
    pub summary_template: Option<String>,
}

impl Schedule {
    /// Trigger time configured for a message kind.
    pub fn time_for(&self, kind: MessageKind) -> Option<&str> {
        match kind {
            MessageKind::Reminder => self.reminder_time.as_deref(),
            MessageKind::Summary => self.summary_time.as_deref(),
        }
    }

    /// Custom template for a message kind. Blank templates count as absent.
    pub fn template_for(&self, kind: MessageKind) -> Option<&str> {
        let tpl = match kind {
            MessageKind::Reminder => self.reminder_template.as_deref(),
            MessageKind::Summary => self.summary_template.as_deref(),
        };
        tpl.filter(|t| !t.trim().is_empty())
    }
}

/// A recipient's goal for one reference-clock calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyTarget {
    pub recipient_id: String,
    /// `YYYY-MM-DD` in the reference clock.
    pub date: String,
    pub target: u32,
}

/// Raw stored representation of an activity's creation time.
///
/// Stores are inconsistent about this; the resolver normalizes every variant
/// to a reference-clock date before comparing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ActivityStamp {
    /// Epoch seconds or milliseconds.
    Epoch(i64),
    /// Date, RFC 3339 timestamp, or `YYYY-MM-DD HH:MM:SS`.
    Text(String),
}

/// The two daily message kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Reminder,
    Summary,
}

impl MessageKind {
    pub const ALL: [MessageKind; 2] = [MessageKind::Reminder, MessageKind::Summary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reminder => "reminder",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message ready for the transport. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outcome of one recipient/kind attempt within an invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// Recipient address.
    pub recipient: String,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(rename = "success")]
    pub sent: bool,
    pub scheduled_time: String,
    pub current_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_result_wire_shape() {
        let r = DispatchResult {
            recipient: "a@example.com".into(),
            recipient_id: "u1".into(),
            kind: MessageKind::Summary,
            sent: false,
            scheduled_time: "18:00".into(),
            current_time: "18:00".into(),
            error: Some("SMTP send: timeout".into()),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "summary");
        assert_eq!(json["success"], false);
        assert_eq!(json["scheduledTime"], "18:00");
        assert_eq!(json["recipientId"], "u1");
        assert_eq!(json["error"], "SMTP send: timeout");
    }

    #[test]
    fn test_error_omitted_on_success() {
        let r = DispatchResult {
            recipient: "a@example.com".into(),
            recipient_id: "u1".into(),
            kind: MessageKind::Reminder,
            sent: true,
            scheduled_time: "09:00".into(),
            current_time: "09:00".into(),
            error: None,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_activity_stamp_untagged() {
        let stamps: Vec<ActivityStamp> =
            serde_json::from_str(r#"["2026-02-22", 1771718400000]"#).unwrap();
        assert_eq!(stamps[0], ActivityStamp::Text("2026-02-22".into()));
        assert_eq!(stamps[1], ActivityStamp::Epoch(1771718400000));
    }

    #[test]
    fn test_blank_template_is_absent() {
        let s = Schedule {
            recipient_id: "u1".into(),
            reminder_template: Some("   ".into()),
            summary_template: Some("Done {{applications_today}}".into()),
            ..Default::default()
        };
        assert!(s.template_for(MessageKind::Reminder).is_none());
        assert!(s.template_for(MessageKind::Summary).is_some());
    }
}
