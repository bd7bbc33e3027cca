//! File-based recipient store: a JSON snapshot of the external document store.
//!
//! Human-readable and handy for local testing. The file is re-read at the
//! start of every resolution pass so edits show up on the next tick.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use jobtrail_core::error::{JobtrailError, Result};
use jobtrail_core::traits::RecipientStore;
use jobtrail_core::types::{ActivityStamp, DailyTarget, MessageKind, Recipient, Schedule};
use serde::{Deserialize, Serialize};

/// One activity (job application) record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityRecord {
    pub recipient_id: String,
    pub created_at: ActivityStamp,
}

/// On-disk shape of `recipients.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub daily_targets: Vec<DailyTarget>,
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
}

type SendKey = (String, MessageKind, String);

/// JSON snapshot store. Send claims live in memory only.
pub struct JsonStore {
    path: Option<PathBuf>,
    snapshot: RwLock<Snapshot>,
    claimed: Mutex<HashSet<SendKey>>,
}

impl JsonStore {
    /// Open a snapshot file. The file must exist and parse.
    pub fn open(path: &Path) -> Result<Self> {
        let snapshot = Self::read(path)?;
        tracing::info!(
            "📂 Loaded {} recipient(s) from {}",
            snapshot.recipients.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            snapshot: RwLock::new(snapshot),
            claimed: Mutex::new(HashSet::new()),
        })
    }

    /// A store over an in-memory snapshot, never re-read.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self { path: None, snapshot: RwLock::new(snapshot), claimed: Mutex::new(HashSet::new()) }
    }

    fn read(path: &Path) -> Result<Snapshot> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Re-read the backing file, if any.
    fn refresh(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let fresh = Self::read(path)?;
            *self.snapshot.write().map_err(|e| JobtrailError::Store(format!("Lock: {e}")))? = fresh;
        }
        Ok(())
    }

    fn with_snapshot<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Result<T> {
        let snap = self.snapshot.read().map_err(|e| JobtrailError::Store(format!("Lock: {e}")))?;
        Ok(f(&snap))
    }
}

#[async_trait]
impl RecipientStore for JsonStore {
    async fn list_enabled_recipients(&self) -> Result<Vec<Recipient>> {
        self.refresh()?;
        self.with_snapshot(|s| {
            s.recipients.iter().filter(|r| r.notifications_enabled).cloned().collect()
        })
    }

    async fn find_recipient(&self, identifier: &str) -> Result<Option<Recipient>> {
        self.refresh()?;
        self.with_snapshot(|s| {
            s.recipients
                .iter()
                .find(|r| r.id == identifier || r.email.eq_ignore_ascii_case(identifier))
                .cloned()
        })
    }

    async fn schedule_for(&self, recipient_id: &str) -> Result<Option<Schedule>> {
        self.with_snapshot(|s| s.schedules.iter().find(|x| x.recipient_id == recipient_id).cloned())
    }

    async fn daily_target_for(&self, recipient_id: &str, date: &str) -> Result<Option<DailyTarget>> {
        self.with_snapshot(|s| {
            s.daily_targets
                .iter()
                .find(|t| t.recipient_id == recipient_id && t.date == date)
                .cloned()
        })
    }

    async fn activity_stamps(&self, recipient_id: &str) -> Result<Vec<ActivityStamp>> {
        self.with_snapshot(|s| {
            s.activities
                .iter()
                .filter(|a| a.recipient_id == recipient_id)
                .map(|a| a.created_at.clone())
                .collect()
        })
    }

    async fn claim_send(&self, recipient_id: &str, kind: MessageKind, date: &str) -> Result<bool> {
        let mut claimed = self.claimed.lock().map_err(|e| JobtrailError::Store(format!("Lock: {e}")))?;
        Ok(claimed.insert((recipient_id.to_string(), kind, date.to_string())))
    }
}
