//! Sync process settings.

use serde::Deserialize;
use std::path::PathBuf;

/// Where the sync config lives and how the process runs.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    /// Path of the YAML sync config.
    pub config_path: PathBuf,
    /// Run a full resync of every repository at start-up.
    pub at_start: bool,
    /// Seconds between heartbeat log lines; `0` disables the heartbeat.
    pub heartbeat_secs: u64,
    /// Pid file written at start and removed on shutdown.
    pub pid_file: PathBuf,
}
