//! `gitsync` daemon: serves the GitHub webhook and keeps branch chains in sync.

use anyhow::Context;
use gitsync_kernel::escalation::{
    GitHubClient, GitHubConfig, GitHubEscalator, MailgunConfig, MailgunMailer,
};
use gitsync_kernel::infrastructure::{
    audit, config::Settings, heartbeat, pidfile::PidFile, server, sync_config::SyncConfig,
    telemetry::TelemetryBuilder,
};
use gitsync_kernel::orchestrator::{log_settlement, Orchestrator};
use gitsync_kernel::queue::JobQueue;
use gitsync_kernel::vcs::{GitCli, GitCredentials};
use gitsync_kernel::webhook::WebhookState;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};

const NOTIFICATION_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Settings::new().context("Failed to load configuration")?;

    let telemetry = TelemetryBuilder::from_settings(&config.telemetry, env!("CARGO_PKG_VERSION"))
        .with_attribute(
            "gitsync.sync_config",
            config.sync.config_path.display().to_string(),
        )
        .with_attribute("gitsync.webhook_enabled", config.github.webhook_secret.is_some())
        .with_metrics()
        .init()
        .context("Failed to initialize telemetry")?;

    info!("gitsync starting...");
    audit::log_audit(&audit::AuditEvent::SystemStartup {
        component: "gitsync".into(),
    });

    let _pid_file = PidFile::create(&config.sync.pid_file)?;
    let _heartbeat = heartbeat::spawn(Duration::from_secs(config.sync.heartbeat_secs));

    let sync = SyncConfig::load(&config.sync.config_path).context("Failed to load sync config")?;

    let escalator = GitHubEscalator::new(
        GitHubClient::new(GitHubConfig::new(
            config.github.token.clone(),
            Url::parse(&config.github.api_base_url).context("Invalid GitHub API URL")?,
        )),
        match &config.mail {
            Some(mail) => Some(MailgunMailer::new(MailgunConfig {
                api_key: mail.api_key.clone(),
                domain: mail.domain.clone(),
                from: mail.from.clone(),
                to: mail.recipients(),
                base_url: Url::parse(&mail.base_url).context("Invalid Mailgun URL")?,
            })),
            None => None,
        },
    );

    let (queue, worker) = JobQueue::start();
    let orchestrator = Orchestrator::new(
        sync,
        GitCredentials::new(config.github.token.clone()),
        Arc::new(GitCli::new()),
        Arc::new(escalator),
        queue.clone(),
    );

    orchestrator.prepare_repositories().await;
    if config.sync.at_start {
        for handle in orchestrator.sync_all().await {
            tokio::spawn(log_settlement(handle, "start-up sync".into()));
        }
    }

    let (sink, notifications) = mpsc::channel(NOTIFICATION_BUFFER);
    let webhook = config
        .github
        .webhook_secret
        .clone()
        .map(|secret| WebhookState { secret, sink });
    tokio::spawn(orchestrator.clone().run_notifications(notifications));

    let app = server::router(telemetry.metrics_handle(), webhook);
    let server_config = config.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_config, app, shutdown_signal()).await {
            error!("HTTP server failed: {:?}", e);
        }
    });

    info!("gitsync initialized. Waiting for shutdown signal...");
    if let Err(e) = server.await {
        error!("HTTP server task panicked: {e}");
    }

    info!("Shutdown signal received, cleaning up...");
    queue.stop();
    if let Err(e) = worker.await {
        error!("Queue worker panicked: {e}");
    }
    audit::log_audit(&audit::AuditEvent::SystemShutdown {
        reason: "Signal received".into(),
    });

    info!("gitsync shutdown complete.");
    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
