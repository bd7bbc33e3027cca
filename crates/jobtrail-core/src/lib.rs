//! # Jobtrail Core
//!
//! Shared domain types, traits and configuration for the scheduled
//! notification dispatcher. Everything here is I/O-free except config loading.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::JobtrailConfig;
pub use error::{JobtrailError, Result};
pub use traits::{Mailer, RecipientStore};
pub use types::{
    ActivityStamp, DailyTarget, DispatchResult, MessageKind, Recipient, RenderedMessage, Schedule,
};
