//! Durable publish job queue.
//!
//! Jobs are rows in `publish_jobs`. A worker owns a job from the moment a
//! single `UPDATE … RETURNING` stamps it with the worker's id until it
//! acknowledges (deletes) or releases it. Claims older than the lease
//! timeout are handed out again, which gives at-least-once delivery when a
//! worker dies mid-job.

use crate::error::DatabaseError;
use crate::types::RecordId;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use std::time::Duration;

use super::{Database, PublishJob};

impl Database {
    /// Insert a job row; called inside the admission transaction
    pub(crate) async fn enqueue_job(
        conn: &mut SqliteConnection,
        record_id: RecordId,
        source_path: &str,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publish_jobs (record_id, source_path, attempts, available_at, created_at)
            VALUES (?, ?, 0, ?, ?)
            "#,
        )
        .bind(record_id)
        .bind(source_path)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to enqueue publish job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Claim the oldest deliverable job for `worker_id`
    ///
    /// A job is deliverable when it is unclaimed, or its claim is older than
    /// `lease`, and its `available_at` has passed.
    pub async fn claim_next_job(&self, worker_id: &str, lease: Duration) -> Result<Option<PublishJob>> {
        let now = chrono::Utc::now().timestamp();
        let stale_before = now - lease.as_secs() as i64;

        let job = sqlx::query_as::<_, PublishJob>(
            r#"
            UPDATE publish_jobs
            SET claimed_by = ?, claimed_at = ?, attempts = attempts + 1
            WHERE id = (
                SELECT id FROM publish_jobs
                WHERE (claimed_at IS NULL OR claimed_at < ?) AND available_at <= ?
                ORDER BY available_at ASC, id ASC
                LIMIT 1
            )
            RETURNING id, record_id, source_path, attempts, claimed_by, claimed_at,
                      available_at, created_at
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(stale_before)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to claim publish job: {}",
                e
            )))
        })?;

        Ok(job)
    }

    /// Acknowledge a finished job, removing it from the queue
    ///
    /// Only the current owner can acknowledge; returns false if the claim was
    /// lost to another worker in the meantime.
    pub async fn complete_job(&self, job_id: i64, worker_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM publish_jobs WHERE id = ? AND claimed_by = ?")
            .bind(job_id)
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to complete publish job: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() == 1)
    }

    /// Refresh the claim timestamp of a job still owned by `worker_id`
    ///
    /// Returns false if the claim was lost.
    pub async fn renew_claim(&self, job_id: i64, worker_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE publish_jobs SET claimed_at = ? WHERE id = ? AND claimed_by = ?",
        )
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to renew publish job claim: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Give a job back to the queue, deliverable again after `delay`
    pub async fn release_job(&self, job_id: i64, worker_id: &str, delay: Duration) -> Result<()> {
        let available_at = chrono::Utc::now().timestamp() + delay.as_secs() as i64;

        sqlx::query(
            r#"
            UPDATE publish_jobs
            SET claimed_by = NULL, claimed_at = NULL, available_at = ?
            WHERE id = ? AND claimed_by = ?
            "#,
        )
        .bind(available_at)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to release publish job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Release every claim; used at startup when no worker of this process can own a job yet
    pub async fn release_all_claims(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE publish_jobs SET claimed_by = NULL, claimed_at = NULL WHERE claimed_by IS NOT NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to release job claims: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }

    /// Number of jobs still in the queue (claimed or not)
    pub async fn count_jobs(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM publish_jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count publish jobs: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    /// Look up the job of a record, if it is still queued
    #[cfg(test)]
    pub(crate) async fn get_job_for_record(&self, record_id: RecordId) -> Result<Option<PublishJob>> {
        let job = sqlx::query_as::<_, PublishJob>(
            r#"
            SELECT id, record_id, source_path, attempts, claimed_by, claimed_at,
                   available_at, created_at
            FROM publish_jobs
            WHERE record_id = ?
            "#,
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get publish job: {}",
                e
            )))
        })?;

        Ok(job)
    }
}
