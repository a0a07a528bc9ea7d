//! Inbound GitHub webhook.
//!
//! Verifies the payload signature, turns `push` events into
//! [`PushNotification`]s and hands them to the orchestrator over a channel.

pub mod handlers;
pub mod routes;
pub mod signature;
pub mod types;

pub use routes::{routes, WebhookState};
pub use types::PushNotification;

use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Errors answered to the webhook caller.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// No `X-Hub-Signature-256` header.
    #[error("Missing signature header")]
    MissingSignature,
    /// The signature does not match the body.
    #[error("Invalid signature")]
    InvalidSignature,
    /// The body is not a valid event payload.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    /// The orchestrator no longer accepts notifications.
    #[error("Sync service is shutting down")]
    Unavailable,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
