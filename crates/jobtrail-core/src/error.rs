//! Error types for Jobtrail.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, JobtrailError>;

#[derive(Debug, Error)]
pub enum JobtrailError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A recipient exists but misses a hard precondition (schedule, today's target).
    #[error("Not eligible: {0}")]
    Ineligible(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl JobtrailError {
    /// Whether this error was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Ineligible(_) | Self::InvalidInput(_))
    }
}
