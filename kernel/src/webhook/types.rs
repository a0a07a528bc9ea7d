//! Webhook payloads and the notification handed to the orchestrator.

use serde::Deserialize;
use serde_json::Value;

/// Fields of a GitHub `push` payload this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    /// Pushed ref, e.g. `refs/heads/develop`.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Repository the push went to.
    pub repository: PushRepository,
}

/// Repository section of a push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PushRepository {
    /// Repository name without owner.
    pub name: String,
}

/// A push, as seen by the orchestrator.
#[derive(Debug, Clone)]
pub struct PushNotification {
    /// Repository name.
    pub repository: String,
    /// Head-style ref that was pushed.
    pub git_ref: String,
    /// Full event payload.
    pub data: Value,
}

impl PushNotification {
    /// Event key, `push:<repository>`.
    #[must_use]
    pub fn event_key(&self) -> String {
        format!("push:{}", self.repository)
    }
}
