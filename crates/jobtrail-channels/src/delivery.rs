//! Delivery adapter: the only path from the dispatcher to a transport.
//!
//! Every failure, including "no transport configured", is reported as data.
//! Nothing is retried.

use std::sync::Arc;

use jobtrail_core::config::{EmailConfig, EmailTransport};
use jobtrail_core::error::{JobtrailError, Result};
use jobtrail_core::traits::Mailer;
use jobtrail_core::types::RenderedMessage;

use crate::email::SmtpMailer;
use crate::http_api::HttpApiMailer;

/// Wraps an optional transport. `None` means credentials are absent.
#[derive(Clone)]
pub struct DeliveryAdapter {
    mailer: Option<Arc<dyn Mailer>>,
}

impl DeliveryAdapter {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer: Some(mailer) }
    }

    /// An adapter with no transport; every delivery reports failure.
    pub fn unconfigured() -> Self {
        Self { mailer: None }
    }

    /// Build from config. Missing or invalid transport settings leave the
    /// adapter unconfigured instead of failing startup.
    pub fn from_config(config: &EmailConfig) -> Self {
        if !config.is_configured() {
            tracing::warn!("⚠️ Email transport not configured: deliveries will fail");
            return Self::unconfigured();
        }
        let built: Result<Arc<dyn Mailer>> = match config.transport {
            EmailTransport::Smtp => SmtpMailer::new(config).map(|m| Arc::new(m) as Arc<dyn Mailer>),
            EmailTransport::HttpApi => {
                HttpApiMailer::new(config).map(|m| Arc::new(m) as Arc<dyn Mailer>)
            }
        };
        match built {
            Ok(mailer) => {
                tracing::info!("📧 Email transport ready: {}", mailer.name());
                Self::new(mailer)
            }
            Err(e) => {
                tracing::warn!("⚠️ Email transport unusable: {e}. Deliveries will fail");
                Self::unconfigured()
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.mailer.is_some()
    }

    /// Deliver and keep the failure reason.
    pub async fn try_deliver(&self, address: &str, subject: &str, html_body: &str) -> Result<()> {
        let Some(mailer) = &self.mailer else {
            return Err(JobtrailError::Delivery("Email transport not configured".into()));
        };
        let message = RenderedMessage {
            to: address.to_string(),
            subject: subject.to_string(),
            html: html_body.to_string(),
        };
        mailer.send(&message).await
    }

    /// Deliver one message. `false` on any rejection.
    pub async fn deliver(&self, address: &str, subject: &str, html_body: &str) -> bool {
        match self.try_deliver(address, subject, html_body).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠️ Delivery to {address} failed: {e}");
                false
            }
        }
    }
}
