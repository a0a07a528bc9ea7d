//! Webhook routes.

use axum::{routing::post, Router};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::handlers::github_callback;
use super::types::PushNotification;

/// Shared state of the webhook handlers.
pub struct WebhookState {
    /// Shared secret for `X-Hub-Signature-256`.
    pub secret: SecretString,
    /// Where verified push notifications go.
    pub sink: mpsc::Sender<PushNotification>,
}

/// Router with `POST /github/callback`.
pub fn routes(state: WebhookState) -> Router {
    Router::new()
        .route("/github/callback", post(github_callback))
        .with_state(Arc::new(state))
}
