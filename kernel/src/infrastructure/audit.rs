//! Audit trail for actions that change repositories outside a normal hop.

use serde::Serialize;
use tracing::{info, info_span};

/// Domain event for audit logging.
/// Structured for JSON serialization to enable machine-readable audit trails.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The process started.
    SystemStartup {
        /// Component that started.
        component: String,
    },
    /// The process is shutting down.
    SystemShutdown {
        /// Why.
        reason: String,
    },
    /// A conflicting hop was handed to humans.
    ConflictEscalated {
        /// Repository name.
        repository: String,
        /// Branch that could not be merged.
        upstream: String,
        /// Branch it should have been merged into.
        head: String,
        /// Number of conflicting files.
        files: usize,
    },
    /// A working copy was deleted and cloned again.
    RepositoryRecloned {
        /// Repository name.
        repository: String,
        /// Failure that triggered the re-clone.
        reason: String,
    },
}

/// Logs an audit event to the dedicated audit channel as structured JSON.
/// This uses a specific `target` which can be filtered by the subscriber to redirect to a secure file.
pub fn log_audit(event: &AuditEvent) {
    let span = info_span!(target: "audit", "audit_event");
    let _enter = span.enter();

    let json = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    info!(target: "audit", audit_json = %json, "Audit Event");
}
