//! # Jobtrail Scheduler
//!
//! Per-recipient reminder and summary dispatch.
//!
//! ## Design Principles
//! - Stateless per invocation: eligibility and progress are re-read every time
//! - One reference clock, minute resolution, exact match
//! - Per-attempt failure isolation; only store failures abort an invocation
//! - No retries, no catch-up for missed minutes
//!
//! ## Architecture
//! ```text
//! Trigger (HTTP cron call or in-process ticker, every 60s)
//!   └── Dispatcher::run_invocation(now)
//!         ├── RecipientResolver → enabled recipients + schedule + today's target
//!         │                       (missing pieces counted, not reported per user)
//!         └── per recipient, concurrently
//!               ├── is_due(reminder_time, now) → progress → render → deliver
//!               └── is_due(summary_time, now)  → progress → render → deliver
//!
//! Stores: SqliteStore (rusqlite) | JsonStore (snapshot file)
//! ```

pub mod clock;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod history;
pub mod persistence;
pub mod progress;
pub mod resolver;
pub mod store;
pub mod template;

pub use clock::{ReferenceClock, Tick, is_due};
pub use diagnostics::DiagnosticReport;
pub use dispatch::{DispatchMode, Dispatcher, InvocationReport};
pub use history::{DispatchHistory, HistoryEntry};
pub use persistence::SqliteStore;
pub use progress::{MotivationTier, Progress, compute_progress};
pub use resolver::{RecipientResolver, SkipCounts};
pub use store::JsonStore;
pub use template::{TemplateVars, render};
