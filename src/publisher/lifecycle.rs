//! Startup recovery and shutdown coordination.

use crate::error::Result;
use crate::types::{Event, Status};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::Publisher;

impl Publisher {
    /// Make jobs left over from a previous run deliverable again
    ///
    /// No worker of this process has started yet, so every claim in the
    /// table belongs to a dead process. Redelivered jobs resume or fail
    /// through the worker's normal path.
    pub(crate) async fn recover(&self) -> Result<()> {
        let released = self.db.release_all_claims().await?;
        if released > 0 {
            tracing::info!(released, "Released publish jobs claimed by a previous run");
        }

        let pending = self.db.count_records_by_status(Status::Pending).await?;
        let queued = self.db.count_jobs().await?;
        if pending > 0 || queued > 0 {
            tracing::info!(pending, queued, "Resuming publications from previous session");
        }
        if pending > queued {
            tracing::warn!(
                pending,
                queued,
                "Some pending publications have no queued job and will stay pending"
            );
        }

        let purged = self.db.purge_expired_tokens().await?;
        if purged > 0 {
            tracing::debug!(purged, "Removed expired publish tokens");
        }

        Ok(())
    }

    /// Gracefully shut down the publisher
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new publications
    /// 2. Signals workers to stop claiming jobs
    /// 3. Waits for in-flight publishes, bounded by `worker.shutdown_timeout`
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Jobs not finished by then stay in the queue and are picked up on the
    /// next start.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.worker_state.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new publications");

        self.worker_state.shutdown.cancel();

        let timeout = self.config.worker.shutdown_timeout;
        match tokio::time::timeout(timeout, self.wait_for_active_jobs()).await {
            Ok(()) => {
                tracing::info!("All in-flight publishes completed");
            }
            Err(_) => {
                let remaining = self.worker_state.active_jobs.lock().await.len();
                tracing::warn!(
                    remaining,
                    "Timeout waiting for publishes to complete, they will be redelivered on restart"
                );
            }
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether the publisher still admits new publications
    pub fn is_accepting(&self) -> bool {
        self.worker_state.accepting_new.load(Ordering::SeqCst)
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.worker_state.active_jobs.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for in-flight publishes to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
