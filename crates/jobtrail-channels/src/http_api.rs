//! HTTP email API transport: POSTs a JSON message to a Resend-style endpoint.

use async_trait::async_trait;
use jobtrail_core::config::EmailConfig;
use jobtrail_core::error::{JobtrailError, Result};
use jobtrail_core::traits::Mailer;
use jobtrail_core::types::RenderedMessage;

/// Mailer for transactional email APIs authenticated with a bearer key.
pub struct HttpApiMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpApiMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let api_key = config
            .credential
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| JobtrailError::Config("Email API key not set".into()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key,
            from: format!("{} <{}>", config.from_name, config.from_address),
        })
    }

    fn payload(&self, message: &RenderedMessage) -> serde_json::Value {
        serde_json::json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
        })
    }
}

#[async_trait]
impl Mailer for HttpApiMailer {
    fn name(&self) -> &str {
        "http_api"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<()> {
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| JobtrailError::Delivery(format!("Email API send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("📤 Email API accepted message for {}", message.to);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(JobtrailError::Delivery(format!("Email API error {status}: {body}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobtrail_core::config::EmailTransport;

    #[test]
    fn test_requires_key() {
        let cfg = EmailConfig { transport: EmailTransport::HttpApi, ..Default::default() };
        assert!(HttpApiMailer::new(&cfg).is_err());
    }

    #[test]
    fn test_payload_shape() {
        let cfg = EmailConfig {
            transport: EmailTransport::HttpApi,
            credential: Some("re_123".into()),
            ..Default::default()
        };
        let mailer = HttpApiMailer::new(&cfg).unwrap();
        let msg = RenderedMessage {
            to: "a@example.com".into(),
            subject: "Subj".into(),
            html: "<p>x</p>".into(),
        };
        let p = mailer.payload(&msg);
        assert_eq!(p["to"][0], "a@example.com");
        assert_eq!(p["subject"], "Subj");
        assert_eq!(p["from"], "Jobtrail <notifications@jobtrail.app>");
    }
}
