//! SMTP transport: sends rendered HTML messages via async lettre.
//!
//! Supports Gmail, Outlook, SES SMTP and custom STARTTLS relays.

use async_trait::async_trait;
use jobtrail_core::config::EmailConfig;
use jobtrail_core::error::{JobtrailError, Result};
use jobtrail_core::traits::Mailer;
use jobtrail_core::types::RenderedMessage;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor,
    message::Mailbox, message::header::ContentType, transport::smtp::authentication::Credentials,
};

/// SMTP mailer. The relay connection pool is built once and reused.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build from config. Fails if the sender or relay is invalid or no credential is set.
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let password = config
            .credential
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| JobtrailError::Config("SMTP credential not set".into()))?;

        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| JobtrailError::Config(format!("Invalid from: {e}")))?;

        let username = if config.smtp_username.is_empty() {
            config.from_address.clone()
        } else {
            config.smtp_username.clone()
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| JobtrailError::Config(format!("SMTP relay: {e}")))?
            .port(config.smtp_port)
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self { from, transport })
    }

    fn build(&self, message: &RenderedMessage) -> Result<LettreMessage> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| JobtrailError::Delivery(format!("Invalid to: {e}")))?;

        LettreMessage::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| JobtrailError::Delivery(format!("Build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<()> {
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| JobtrailError::Delivery(format!("SMTP send: {e}")))?;
        tracing::debug!("📤 SMTP accepted message for {}", message.to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".into(),
            credential: Some("pw".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_credential() {
        let cfg = EmailConfig { credential: None, ..config() };
        assert!(matches!(SmtpMailer::new(&cfg), Err(JobtrailError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_sender() {
        let cfg = EmailConfig { from_address: "not an address".into(), ..config() };
        assert!(SmtpMailer::new(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_build_html_message() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let msg = RenderedMessage {
            to: "someone@example.com".into(),
            subject: "Hello".into(),
            html: "<p>hi</p>".into(),
        };
        let built = mailer.build(&msg).unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();
        assert!(raw.contains("Subject: Hello"));
        assert!(raw.contains("text/html"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_delivery_error() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let msg = RenderedMessage { to: "nope".into(), subject: "s".into(), html: String::new() };
        assert!(matches!(mailer.build(&msg), Err(JobtrailError::Delivery(_))));
    }
}
