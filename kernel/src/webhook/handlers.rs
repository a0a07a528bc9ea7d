//! Webhook handler implementations.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use bytes::Bytes;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info};

use super::routes::WebhookState;
use super::signature;
use super::types::{PushNotification, PushPayload};
use super::WebhookError;

/// Header carrying the event name.
pub const EVENT_HEADER: &str = "x-github-event";
/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// POST /github/callback
///
/// Verifies the signature and forwards `push` events. Other events are
/// acknowledged and ignored.
pub async fn github_callback(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    signature::verify(
        state.secret.expose_secret().as_bytes(),
        &body,
        signature_header,
    )?;

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    metrics::counter!("gitsync_webhook_events_total", "event" => event.clone()).increment(1);

    match event.as_str() {
        "ping" => {
            info!("Webhook ping received");
            Ok(StatusCode::OK)
        }
        "push" => {
            let data: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
            let payload: PushPayload = serde_json::from_value(data.clone())
                .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

            let notification = PushNotification {
                repository: payload.repository.name,
                git_ref: payload.git_ref,
                data,
            };
            info!(
                event_key = %notification.event_key(),
                git_ref = %notification.git_ref,
                "Push received"
            );
            state
                .sink
                .send(notification)
                .await
                .map_err(|_| WebhookError::Unavailable)?;
            Ok(StatusCode::ACCEPTED)
        }
        other => {
            debug!(event = other, "Ignoring webhook event");
            Ok(StatusCode::OK)
        }
    }
}
