//! Mail delivery through the Mailgun HTTP API.

use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use super::EscalationError;

/// A rendered mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Mailgun account and addressing.
pub struct MailgunConfig {
    /// Private API key.
    pub api_key: SecretString,
    /// Sending domain.
    pub domain: String,
    /// Sender address.
    pub from: String,
    /// Recipients.
    pub to: Vec<String>,
    /// API root, e.g. `https://api.mailgun.net/`.
    pub base_url: Url,
}

/// Sends mails through Mailgun.
pub struct MailgunMailer {
    client: Client,
    config: MailgunConfig,
}

impl MailgunMailer {
    /// Creates a mailer.
    #[must_use]
    pub fn new(config: MailgunConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Delivers `mail` to the configured recipients.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Mailgun rejects the message.
    pub async fn send(&self, mail: &Mail) -> Result<(), EscalationError> {
        let url = self
            .config
            .base_url
            .join(&format!("v3/{}/messages", self.config.domain))
            .map_err(|e| EscalationError::InvalidUrl(format!("mailgun URL: {e}")))?;

        let to = self.config.to.join(",");
        info!(to = %to, subject = %mail.subject, "Sending mail");
        let res = self
            .client
            .post(url)
            .basic_auth("api", Some(self.config.api_key.expose_secret()))
            .form(&[
                ("from", self.config.from.as_str()),
                ("to", to.as_str()),
                ("subject", mail.subject.as_str()),
                ("html", mail.html.as_str()),
            ])
            .send()
            .await?;

        match res.status() {
            StatusCode::OK => Ok(()),
            status => Err(EscalationError::Api {
                service: "Mailgun",
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }
}
