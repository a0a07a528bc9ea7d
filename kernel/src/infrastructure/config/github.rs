//! GitHub credentials and API location.

use secrecy::SecretString;
use serde::Deserialize;

/// Access to the hosting service.
#[derive(Debug, Deserialize, Clone)]
pub struct GitHubSettings {
    /// Token used for git remotes and the REST API. Empty means anonymous.
    pub token: SecretString,
    /// Shared secret for webhook signatures. The webhook route is disabled
    /// without it.
    pub webhook_secret: Option<SecretString>,
    /// REST API root.
    pub api_base_url: String,
}
