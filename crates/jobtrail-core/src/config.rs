//! Jobtrail configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{JobtrailError, Result};

/// Env var naming an alternate config file.
pub const CONFIG_ENV: &str = "JOBTRAIL_CONFIG";
/// Env var carrying the periodic trigger's bearer secret.
pub const CRON_SECRET_ENV: &str = "JOBTRAIL_CRON_SECRET";
/// Env var enabling the local-testing trigger override.
pub const ALLOW_LOCAL_ENV: &str = "JOBTRAIL_ALLOW_LOCAL_TRIGGER";
/// Env var carrying the email transport credential.
pub const EMAIL_CREDENTIAL_ENV: &str = "JOBTRAIL_EMAIL_CREDENTIAL";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobtrailConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

impl JobtrailConfig {
    /// Load from `JOBTRAIL_CONFIG` or the default path. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load config from a specific path, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| JobtrailError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| JobtrailError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config.with_env_overrides())
    }

    /// Secrets from the environment take precedence over the file.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_env(|key| std::env::var(key).ok());
        self
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = get(CRON_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.trigger.secret = Some(secret);
        }
        if let Some(flag) = get(ALLOW_LOCAL_ENV) {
            self.trigger.allow_local = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        if let Some(cred) = get(EMAIL_CREDENTIAL_ENV).filter(|s| !s.is_empty()) {
            self.email.credential = Some(cred);
        }
    }

    /// Default config path (~/.jobtrail/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// The Jobtrail home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".jobtrail")
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 3000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Sqlite,
    Json,
}

/// Where recipient data lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_backend() -> StoreBackend { StoreBackend::Sqlite }
fn default_store_path() -> String { "~/.jobtrail/jobtrail.db".into() }

impl StoreConfig {
    /// Store path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: default_backend(), path: default_store_path() }
    }
}

/// The single reference clock every schedule is compared in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Offset of the reference clock from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl ClockConfig {
    pub fn offset(&self) -> Result<chrono::FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(chrono::FixedOffset::east_opt)
            .ok_or_else(|| {
                JobtrailError::Config(format!(
                    "utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })
    }
}

/// Dispatch coordinator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Max recipients processed at once within one invocation.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Claim a (recipient, kind, date) key before sending.
    #[serde(default)]
    pub dedupe_per_day: bool,
    /// Invocation reports kept in memory.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Run the periodic trigger in-process when serving.
    #[serde(default)]
    pub tick: bool,
}

fn default_concurrency() -> usize { 8 }
fn default_history_size() -> usize { 50 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            dedupe_per_day: false,
            history_size: default_history_size(),
            tick: false,
        }
    }
}

/// Authentication of the periodic trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Bearer token the scheduler infrastructure presents.
    #[serde(default)]
    pub secret: Option<String>,
    /// Accept unauthenticated scheduled calls (local testing only).
    #[serde(default)]
    pub allow_local: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailTransport {
    Smtp,
    HttpApi,
}

/// Outbound email settings. Without a credential delivery is disabled, not fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_transport")]
    pub transport: EmailTransport,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// SMTP password or API key.
    #[serde(default)]
    pub credential: Option<String>,
}

fn default_transport() -> EmailTransport { EmailTransport::Smtp }
fn default_from_address() -> String { "notifications@jobtrail.app".into() }
fn default_from_name() -> String { "Jobtrail".into() }
fn default_smtp_port() -> u16 { 587 }
fn default_api_url() -> String { "https://api.resend.com/emails".into() }

impl EmailConfig {
    /// Whether a transport credential is present.
    pub fn is_configured(&self) -> bool {
        let has_cred = self.credential.as_deref().is_some_and(|c| !c.trim().is_empty());
        match self.transport {
            EmailTransport::Smtp => has_cred && !self.smtp_host.is_empty(),
            EmailTransport::HttpApi => has_cred && !self.api_url.is_empty(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            from_address: default_from_address(),
            from_name: default_from_name(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            api_url: default_api_url(),
            credential: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = JobtrailConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.dispatch.concurrency, 8);
        assert!(!config.dispatch.dedupe_per_day);
        assert!(!config.email.is_configured());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [clock]
            utc_offset_minutes = 420

            [dispatch]
            concurrency = 2
            dedupe_per_day = true

            [email]
            transport = "http_api"
            credential = "re_123"

            [store]
            backend = "json"
            path = "/tmp/recipients.json"
        "#;

        let config: JobtrailConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.clock.utc_offset_minutes, 420);
        assert_eq!(config.dispatch.concurrency, 2);
        assert!(config.dispatch.dedupe_per_day);
        assert_eq!(config.email.transport, EmailTransport::HttpApi);
        assert!(config.email.is_configured());
        assert_eq!(config.store.backend, StoreBackend::Json);
        assert_eq!(config.dispatch.history_size, 50);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: JobtrailConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.email.smtp_port, 587);
        assert!(config.trigger.secret.is_none());
    }

    #[test]
    fn test_smtp_needs_host_and_credential() {
        let mut email = EmailConfig { credential: Some("pw".into()), ..Default::default() };
        assert!(!email.is_configured());
        email.smtp_host = "smtp.example.com".into();
        assert!(email.is_configured());
        email.credential = Some("  ".into());
        assert!(!email.is_configured());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (CRON_SECRET_ENV, "s3cret"),
            (ALLOW_LOCAL_ENV, "1"),
            (EMAIL_CREDENTIAL_ENV, "key"),
        ]);
        let mut config = JobtrailConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.trigger.secret.as_deref(), Some("s3cret"));
        assert!(config.trigger.allow_local);
        assert_eq!(config.email.credential.as_deref(), Some("key"));
    }

    #[test]
    fn test_clock_offset_bounds() {
        assert!(ClockConfig { utc_offset_minutes: -300 }.offset().is_ok());
        assert!(ClockConfig { utc_offset_minutes: 24 * 60 }.offset().is_err());
        assert!(ClockConfig { utc_offset_minutes: i32::MAX }.offset().is_err());
        assert!(ClockConfig { utc_offset_minutes: i32::MIN }.offset().is_err());
    }

    #[test]
    fn test_home_dir() {
        let home = JobtrailConfig::home_dir();
        assert!(home.to_string_lossy().contains("jobtrail"));
    }
}
