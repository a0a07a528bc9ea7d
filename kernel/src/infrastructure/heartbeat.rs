//! Periodic liveness log line.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Spawns a task that logs `ping` every `interval`. Returns `None` for a zero
/// interval.
#[must_use]
pub fn spawn(interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            info!("ping");
        }
    }))
}
