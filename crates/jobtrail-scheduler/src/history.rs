//! Recent invocation history: an in-memory ring buffer for operators.
//! Nothing here survives a restart.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use jobtrail_core::error::JobtrailError;
use serde::Serialize;

use crate::dispatch::{DispatchMode, InvocationReport};

/// One invocation as seen afterwards: its report, or why it aborted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    pub mode: DispatchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<InvocationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct DispatchHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl DispatchHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn record(&mut self, report: &InvocationReport) {
        self.push(HistoryEntry {
            recorded_at: Utc::now(),
            mode: report.mode,
            report: Some(report.clone()),
            error: None,
        });
    }

    pub fn record_failure(&mut self, mode: DispatchMode, error: &JobtrailError) {
        self.push(HistoryEntry {
            recorded_at: Utc::now(),
            mode,
            report: None,
            error: Some(error.to_string()),
        });
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<HistoryEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DispatchHistory {
    fn default() -> Self {
        Self::new(50)
    }
}
