//! HTTP server: health, metrics and the webhook.

use crate::infrastructure::config::{BindAddress, Settings};
use crate::webhook::{self, WebhookState};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use tokio::net::TcpListener;

async fn health_check() -> &'static str {
    "OK"
}

/// Builds the application router. `/metrics` is mounted when a Prometheus
/// handle is given, the webhook when its state is.
pub fn router(metrics: Option<PrometheusHandle>, webhook: Option<WebhookState>) -> Router {
    let mut app = Router::new()
        .route("/health/live", get(health_check))
        .route("/health/ready", get(health_check));

    if let Some(handle) = metrics {
        app = app.route("/metrics", get(move || std::future::ready(handle.render())));
    }
    if let Some(state) = webhook {
        app = app.merge(webhook::routes(state));
    } else {
        tracing::warn!("No webhook secret configured, /github/callback is disabled");
    }
    app
}

/// Binds the configured address and serves `app` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address is invalid or the server fails.
pub async fn run_server(
    config: &Settings,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = BindAddress::from(&config.server).to_socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);
    serve(listener, app, shutdown).await
}

/// Serves `app` on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
