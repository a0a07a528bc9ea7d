/// Audit logging for repository-changing events.
pub mod audit;
/// Process settings.
pub mod config;
/// Periodic liveness log line.
pub mod heartbeat;
/// Pid file guard.
pub mod pidfile;
/// HTTP server: health, metrics and webhook.
pub mod server;
/// YAML sync config loading.
pub mod sync_config;
/// Telemetry setup for logging, tracing, and metrics.
pub mod telemetry;
