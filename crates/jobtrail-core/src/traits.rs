//! Seams to the external collaborators: the document store and the email transport.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ActivityStamp, DailyTarget, MessageKind, Recipient, RenderedMessage, Schedule};

/// Read access to recipient records, schedules, targets and activity.
///
/// An `Err` from any method means the store itself failed; missing records are
/// `Ok(None)` / empty.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// All recipients with notifications enabled.
    async fn list_enabled_recipients(&self) -> Result<Vec<Recipient>>;

    /// Look up one recipient by id or email address, regardless of its flag.
    async fn find_recipient(&self, identifier: &str) -> Result<Option<Recipient>>;

    async fn schedule_for(&self, recipient_id: &str) -> Result<Option<Schedule>>;

    /// Target for the given `YYYY-MM-DD` date.
    async fn daily_target_for(&self, recipient_id: &str, date: &str) -> Result<Option<DailyTarget>>;

    /// Raw creation stamps of the recipient's activity records.
    async fn activity_stamps(&self, recipient_id: &str) -> Result<Vec<ActivityStamp>>;

    /// Claim the `(recipient, kind, date)` send key. Returns `false` if it was
    /// already claimed. Only consulted when per-day dedupe is enabled.
    async fn claim_send(&self, recipient_id: &str, kind: MessageKind, date: &str) -> Result<bool>;
}

/// Outbound email transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &RenderedMessage) -> Result<()>;
}
