//! Periodic reclamation of idle sessions.

use crate::voice::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawns the background sweep loop. Runs until the returned handle is
/// aborted, which happens implicitly at process shutdown.
pub fn spawn(registry: Arc<SessionRegistry>, interval: Duration, ttl: Duration) -> JoinHandle<()> {
    info!(
        interval_secs = interval.as_secs(),
        ttl_secs = ttl.as_secs(),
        "Starting session sweeper"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh process
        // does not sweep before anything can exist.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let swept = registry.sweep(ttl).await;
            if swept > 0 {
                info!(swept, "Sweeper reclaimed expired sessions");
            } else {
                debug!("Sweeper found nothing to reclaim");
            }
        }
    })
}
