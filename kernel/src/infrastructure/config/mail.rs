//! Mailgun settings for conflict mails.

use secrecy::SecretString;
use serde::Deserialize;

/// Mail delivery settings. Conflict mails are skipped when absent.
#[derive(Debug, Deserialize, Clone)]
pub struct MailSettings {
    /// Mailgun private API key.
    pub api_key: SecretString,
    /// Sending domain.
    pub domain: String,
    /// Sender address.
    pub from: String,
    /// Comma separated recipients.
    pub to: String,
    /// Mailgun API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl MailSettings {
    /// Recipients as a list, blanks removed.
    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        self.to
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

fn default_base_url() -> String {
    "https://api.mailgun.net/".into()
}
