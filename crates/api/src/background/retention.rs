//! Periodic removal of jobs past their retention window.
//!
//! Lookups already hide expired jobs; the sweep reclaims memory for jobs
//! nobody asks about again and closes their feeds.

use std::sync::Arc;
use std::time::Duration;

use fetchline_registry::JobRegistry;
use tokio_util::sync::CancellationToken;

/// Run the retention sweep every `interval` until `cancel` fires.
pub async fn run(registry: Arc<dyn JobRegistry>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Job retention sweep started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                let purged = registry.purge_expired();
                if purged > 0 {
                    tracing::info!(purged, remaining = registry.len(), "Job retention: purged expired jobs");
                } else {
                    tracing::debug!("Job retention: nothing to purge");
                }
            }
        }
    }
}
