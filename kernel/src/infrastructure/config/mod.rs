//! Process settings.
//!
//! Values come from built-in defaults overridden by environment variables
//! prefixed with `GITSYNC`, using `__` between nested keys:
//!
//! ```text
//! GITSYNC__GITHUB__TOKEN=ghp_...
//! GITSYNC__GITHUB__WEBHOOK_SECRET=...
//! GITSYNC__SERVER__PORT=8080
//! GITSYNC__SYNC__AT_START=true
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gitsync_kernel::infrastructure::config::Settings;
//!
//! let settings = Settings::new().expect("Failed to load configuration");
//! ```

pub mod github;
pub mod mail;
pub mod server;
pub mod sync;
pub mod telemetry;

pub use github::GitHubSettings;
pub use mail::MailSettings;
pub use server::ServerSettings;
pub use sync::SyncSettings;
pub use telemetry::TelemetrySettings;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GITSYNC";

/// Top-level process settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Server settings.
    pub server: ServerSettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
    /// GitHub access.
    pub github: GitHubSettings,
    /// Sync behaviour.
    pub sync: SyncSettings,
    /// Conflict mail delivery.
    pub mail: Option<MailSettings>,
}

impl Settings {
    /// Loads settings from the process environment and defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    /// Loads settings from the given environment source on top of defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be built or deserialized.
    pub fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 9090)?
            .set_default("telemetry.service_name", "gitsync")?
            .set_default("telemetry.sampling_ratio", 1.0)?
            .set_default("telemetry.log_level", "info")?
            .set_default("github.token", "")?
            .set_default("github.api_base_url", "https://api.github.com/")?
            .set_default("sync.config_path", "sync-config.yml")?
            .set_default("sync.at_start", false)?
            .set_default("sync.heartbeat_secs", 10)?
            .set_default("sync.pid_file", "git-synced.pid")?
            .add_source(environment)
            .build()?;

        s.try_deserialize()
    }
}

/// Helper for strong typing addresses
pub struct BindAddress(pub String, pub u16);

impl BindAddress {
    /// Converts the bind address to a `SocketAddr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the IP address string cannot be parsed.
    pub fn to_socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        let ip = self
            .0
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid IP address '{}': {e}", self.0))?;
        Ok(std::net::SocketAddr::new(ip, self.1))
    }
}

impl From<&ServerSettings> for BindAddress {
    fn from(server: &ServerSettings) -> Self {
        Self(server.host.clone(), server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_environment(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .source(Some(map)),
        )
    }

    #[test]
    fn defaults_apply_without_environment() -> Result<(), ConfigError> {
        let settings = load(&[])?;
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.sync.heartbeat_secs, 10);
        assert!(!settings.sync.at_start);
        assert_eq!(settings.sync.pid_file.to_str(), Some("git-synced.pid"));
        assert!(settings.github.token.expose_secret().is_empty());
        assert!(settings.github.webhook_secret.is_none());
        assert!(settings.mail.is_none());
        Ok(())
    }

    #[test]
    fn environment_overrides_defaults() -> Result<(), ConfigError> {
        let settings = load(&[
            ("GITSYNC__SERVER__PORT", "8080"),
            ("GITSYNC__SYNC__AT_START", "true"),
            ("GITSYNC__GITHUB__TOKEN", "ghp_test"),
            ("GITSYNC__GITHUB__WEBHOOK_SECRET", "hush"),
        ])?;
        assert_eq!(settings.server.port, 8080);
        assert!(settings.sync.at_start);
        assert_eq!(settings.github.token.expose_secret(), "ghp_test");
        assert_eq!(
            settings
                .github
                .webhook_secret
                .as_ref()
                .map(|s| s.expose_secret().to_string()),
            Some("hush".to_string())
        );
        Ok(())
    }

    #[test]
    fn mail_section_splits_recipients() -> Result<(), ConfigError> {
        let settings = load(&[
            ("GITSYNC__MAIL__API_KEY", "key-1"),
            ("GITSYNC__MAIL__DOMAIN", "mg.example.com"),
            ("GITSYNC__MAIL__FROM", "sync@example.com"),
            ("GITSYNC__MAIL__TO", "a@example.com, b@example.com"),
        ])?;
        let mail = settings.mail.ok_or_else(|| ConfigError::NotFound("mail".into()))?;
        assert_eq!(mail.recipients(), vec!["a@example.com", "b@example.com"]);
        assert_eq!(mail.base_url, "https://api.mailgun.net/");
        Ok(())
    }

    #[test]
    fn bind_address_rejects_hostnames() {
        assert!(BindAddress("localhost".into(), 80).to_socket_addr().is_err());
        assert!(BindAddress("0.0.0.0".into(), 80).to_socket_addr().is_ok());
    }
}
