//! Publish workers: claim a job, move the file, finalize the record, acknowledge.

use crate::config::StrategyMode;
use crate::db::{PublicationRecord, PublishJob};
use crate::error::{PublishError, Result};
use crate::retry::with_retry;
use crate::types::{Event, PublishOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::Publisher;
use super::strategy::{self, PublishStrategy, PublishedFile};

/// What a worker will do for a job once the filesystem has been inspected
enum Plan {
    /// An earlier delivery already put the artifact in place
    Resumed(PublishedFile),
    /// Publish with the selected strategy
    Run(PublishStrategy),
}

impl Publisher {
    /// Start the publish worker pool
    ///
    /// Spawns `worker.max_concurrent_publishes` loops. Each loop claims one
    /// job at a time, sleeping between jobs until an admission wakes it or the
    /// poll interval elapses. Loops exit once [`shutdown`](Self::shutdown) is
    /// called and their current job is done.
    pub fn start_workers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let count = self.config.worker.max_concurrent_publishes;

        let handles = (0..count)
            .map(|n| {
                let publisher = self.clone();
                let worker_id = format!("{}-{}", self.worker_state.instance_id, n);
                tokio::spawn(async move { publisher.worker_loop(worker_id).await })
            })
            .collect();

        tracing::info!(workers = count, "Publish workers started");
        handles
    }

    async fn worker_loop(self, worker_id: String) {
        let shutdown = self.worker_state.shutdown.clone();
        let wake = self.worker_state.wake.clone();
        let poll_interval = self.config.worker.poll_interval;

        tracing::debug!(worker_id = %worker_id, "Publish worker running");

        while !shutdown.is_cancelled() {
            match self.process_next_job(&worker_id).await {
                // Drain the queue before sleeping again
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(worker_id = %worker_id, error = %e, "Publish worker iteration failed");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = wake.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        tracing::debug!(worker_id = %worker_id, "Publish worker stopped");
    }

    /// Claim and process at most one job
    ///
    /// Returns `Ok(false)` when no job was deliverable. Errors mean the job
    /// could not be finalized; it is released back to the queue after
    /// `retry.initial_delay` and resumes on its next delivery.
    pub async fn process_next_job(&self, worker_id: &str) -> Result<bool> {
        let lease = self.config.worker.lease_timeout;
        let Some(job) = self.db.claim_next_job(worker_id, lease).await? else {
            return Ok(false);
        };

        tracing::debug!(
            job_id = job.id,
            record_id = %job.record_id,
            attempts = job.attempts,
            worker_id,
            "Claimed publish job"
        );

        self.worker_state
            .active_jobs
            .lock()
            .await
            .insert(job.record_id);

        let result = self.process_job(&job, worker_id).await;

        if result.is_err() {
            let delay = self.config.retry.initial_delay;
            if let Err(e) = self.db.release_job(job.id, worker_id, delay).await {
                // Lease expiry still redelivers the job
                tracing::warn!(job_id = job.id, error = %e, "Failed to release publish job");
            }
        }

        self.worker_state
            .active_jobs
            .lock()
            .await
            .remove(&job.record_id);

        result.map(|()| true)
    }

    async fn process_job(&self, job: &PublishJob, worker_id: &str) -> Result<()> {
        let Some(record) = self.db.get_record(job.record_id).await? else {
            tracing::warn!(job_id = job.id, record_id = %job.record_id, "Dropping job for missing record");
            self.db.complete_job(job.id, worker_id).await?;
            return Ok(());
        };

        if record.status().is_terminal() {
            tracing::debug!(
                job_id = job.id,
                record_id = %record.id,
                status = %record.status(),
                "Record already finalized, acknowledging job"
            );
            self.db.complete_job(job.id, worker_id).await?;
            return Ok(());
        }

        let outcome = self
            .with_heartbeat(job, worker_id, self.execute(&record, job))
            .await;
        self.finalize(&record, outcome).await?;

        if !self.db.complete_job(job.id, worker_id).await? {
            tracing::warn!(
                job_id = job.id,
                record_id = %record.id,
                worker_id,
                "Job claim was lost before acknowledgement"
            );
        }
        Ok(())
    }

    /// Drive `work` while keeping the job's claim fresh
    ///
    /// The claim is renewed every third of `worker.lease_timeout`, so a long
    /// copy is never handed to a second worker while this one still runs it.
    pub(super) async fn with_heartbeat<F: Future>(
        &self,
        job: &PublishJob,
        worker_id: &str,
        work: F,
    ) -> F::Output {
        let period = (self.config.worker.lease_timeout / 3).max(Duration::from_millis(100));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(work);

        loop {
            tokio::select! {
                output = &mut work => return output,
                _ = heartbeat.tick() => match self.db.renew_claim(job.id, worker_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(job_id = job.id, worker_id, "Publish job claim lost while running");
                    }
                    Err(e) => {
                        tracing::warn!(job_id = job.id, error = %e, "Failed to renew publish job claim");
                    }
                },
            }
        }
    }

    /// Perform the filesystem transition for a pending record
    async fn execute(&self, record: &PublicationRecord, job: &PublishJob) -> PublishOutcome {
        let source = PathBuf::from(&job.source_path);
        let dest = record.published_path(&self.config.storage.public_dir_name);
        let mode = self.config.storage.strategy;
        let redelivered = job.attempts > 1;

        let plan = {
            let (source, dest) = (source.clone(), dest.clone());
            run_blocking(move || prepare(&source, &dest, mode, redelivered)).await
        };

        let result = match plan {
            Ok(Plan::Resumed(published)) => {
                tracing::info!(
                    record_id = %record.id,
                    path = %dest.display(),
                    "Resumed interrupted publish"
                );
                Ok(published)
            }
            Ok(Plan::Run(strategy)) => {
                tracing::info!(
                    record_id = %record.id,
                    strategy = %strategy,
                    source = %source.display(),
                    dest = %dest.display(),
                    "Publishing file"
                );
                self.emit_event(Event::Publishing {
                    id: record.id,
                    strategy: strategy.as_str().to_string(),
                });

                let disk_space = self.config.disk_space.clone();
                with_retry(&self.config.retry, || {
                    let (source, dest, disk_space) = (source.clone(), dest.clone(), disk_space.clone());
                    run_blocking(move || strategy.publish(&source, &dest, &disk_space))
                })
                .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(PublishedFile { size, hash }) => PublishOutcome::Available { size, hash },
            Err(e) => PublishOutcome::Error {
                reason: e.to_string(),
            },
        }
    }

    /// Store the outcome on the record and tell subscribers
    async fn finalize(&self, record: &PublicationRecord, outcome: PublishOutcome) -> Result<()> {
        match outcome {
            PublishOutcome::Available { size, hash } => {
                let updated = self
                    .db
                    .finalize_available(record.id, size, &hash)
                    .await
                    .inspect_err(|e| {
                        tracing::error!(record_id = %record.id, error = %e, "Failed to finalize publication");
                    })?;

                if updated {
                    tracing::info!(record_id = %record.id, size, hash = %hash, "Publication available");
                    self.emit_event(Event::Available {
                        id: record.id,
                        size,
                        hash,
                        email: record.email.clone(),
                    });
                } else {
                    tracing::warn!(record_id = %record.id, "Record left pending state during publish");
                }
            }
            PublishOutcome::Error { reason } => {
                let updated = self
                    .db
                    .finalize_error(record.id, &reason)
                    .await
                    .inspect_err(|e| {
                        tracing::error!(record_id = %record.id, error = %e, "Failed to record publish failure");
                    })?;

                if updated {
                    tracing::warn!(record_id = %record.id, reason = %reason, "Publication failed");
                    self.emit_event(Event::Failed {
                        id: record.id,
                        reason,
                        email: record.email.clone(),
                    });
                } else {
                    tracing::warn!(record_id = %record.id, "Record left pending state during publish");
                }
            }
        }
        Ok(())
    }
}

/// Create the public folder, detect resumable work, then pick a strategy
fn prepare(source: &Path, dest: &Path, mode: StrategyMode, redelivered: bool) -> std::result::Result<Plan, PublishError> {
    if let Some(dest_dir) = dest.parent() {
        fs::create_dir_all(dest_dir).map_err(|e| PublishError::fs("create", dest_dir, e))?;
    }

    if let Some(published) = strategy::resume(source, dest, redelivered)? {
        return Ok(Plan::Resumed(published));
    }

    strategy::check_source(source)?;

    let dest_dir = dest.parent().unwrap_or(dest);
    PublishStrategy::select(mode, source, dest_dir).map(Plan::Run)
}

async fn run_blocking<T, F>(f: F) -> std::result::Result<T, PublishError>
where
    F: FnOnce() -> std::result::Result<T, PublishError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PublishError::TaskAborted(e.to_string()))?
}
