//! Publication record admission, finalization and queries.

use crate::error::DatabaseError;
use crate::types::{RecordId, Status};
use crate::utils::stored_file_name;
use crate::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};

use super::{Database, NewPublication, PublicationRecord};

/// Message carried by the conflict error on identity collisions
pub const DUPLICATE_VERSION: &str = "File is already published in that version";

const RECORD_COLUMNS: &str = r#"
    id, file_name, stored_file_name, repo_path, version, size, hash, status,
    error_message, owner, contact, email, publishing_date, download_count, created_at
"#;

impl Database {
    /// Admit a publication: resolve its version, insert the pending record and
    /// enqueue its job, all in one write transaction
    ///
    /// The transaction is opened with `BEGIN IMMEDIATE` so two admissions for
    /// the same identity serialize on the write lock; the partial unique index
    /// is the final arbiter and its violation is reported as a conflict.
    ///
    /// The transaction runs on its own task, so dropping the returned future
    /// (a client hanging up mid-request) does not interrupt it between
    /// `BEGIN` and `COMMIT`. The admission completes or rolls back in the
    /// background.
    pub async fn admit_publication(&self, new: &NewPublication) -> Result<PublicationRecord> {
        let pool = self.pool.clone();
        let new = new.clone();

        tokio::spawn(async move { Self::admit_on_pool(&pool, &new).await })
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Admission task failed: {}",
                    e
                )))
            })?
    }

    async fn admit_on_pool(pool: &SqlitePool, new: &NewPublication) -> Result<PublicationRecord> {
        // Rolled back on drop, so an early return leaves the connection clean
        let mut tx = pool.begin_with("BEGIN IMMEDIATE").await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin admission transaction: {}",
                e
            )))
        })?;

        let record = Self::admit_in_transaction(&mut *tx, new).await?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit admission: {}",
                e
            )))
        })?;

        Ok(record)
    }

    async fn admit_in_transaction(
        conn: &mut SqliteConnection,
        new: &NewPublication,
    ) -> Result<PublicationRecord> {
        let version = match new.version {
            Some(version) => {
                let taken: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM publications
                    WHERE repo_path = ? AND file_name = ? AND version = ? AND status != 'error'
                    "#,
                )
                .bind(&new.repo_path)
                .bind(&new.file_name)
                .bind(version)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check publication identity: {}",
                        e
                    )))
                })?;

                if taken > 0 {
                    return Err(Error::Conflict(DUPLICATE_VERSION.to_string()));
                }
                version
            }
            None => {
                let latest: Option<i64> = sqlx::query_scalar(
                    r#"
                    SELECT MAX(version) FROM publications
                    WHERE repo_path = ? AND file_name = ? AND status != 'error'
                    "#,
                )
                .bind(&new.repo_path)
                .bind(&new.file_name)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to resolve next version: {}",
                        e
                    )))
                })?;
                latest.unwrap_or(0) + 1
            }
        };

        let id = RecordId::new();
        let now = chrono::Utc::now().timestamp();
        let stored = stored_file_name(&new.file_name, version);

        sqlx::query(
            r#"
            INSERT INTO publications (
                id, file_name, stored_file_name, repo_path, version, status,
                owner, contact, email, download_count, created_at
            ) VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?, 0, ?)
            "#,
        )
        .bind(id)
        .bind(&new.file_name)
        .bind(&stored)
        .bind(&new.repo_path)
        .bind(version)
        .bind(&new.owner)
        .bind(&new.contact)
        .bind(&new.email)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Error::Conflict(DUPLICATE_VERSION.to_string())
            }
            e => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert publication: {}",
                e
            ))),
        })?;

        Self::enqueue_job(conn, id, &new.source_path, now).await?;

        Ok(PublicationRecord {
            id,
            file_name: new.file_name.clone(),
            stored_file_name: stored,
            repo_path: new.repo_path.clone(),
            version,
            size: None,
            hash: None,
            status: Status::Pending.as_str().to_string(),
            error_message: None,
            owner: new.owner.clone(),
            contact: new.contact.clone(),
            email: new.email.clone(),
            publishing_date: None,
            download_count: 0,
            created_at: now,
        })
    }

    /// Get a publication record by ID
    pub async fn get_record(&self, id: RecordId) -> Result<Option<PublicationRecord>> {
        let row = sqlx::query_as::<_, PublicationRecord>(&format!(
            "SELECT {} FROM publications WHERE id = ?",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get publication: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Move a pending record to `available`
    ///
    /// Returns false when the record was not pending (already terminal or
    /// unknown); the record is left untouched in that case.
    pub async fn finalize_available(&self, id: RecordId, size: u64, hash: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE publications
            SET status = 'available', size = ?, hash = ?, publishing_date = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(size as i64)
        .bind(hash)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to finalize publication as available: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a pending record to `error`
    ///
    /// Returns false when the record was not pending.
    pub async fn finalize_error(&self, id: RecordId, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE publications
            SET status = 'error', error_message = ?, publishing_date = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(reason)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to finalize publication as error: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// Count one completed download of an available record
    pub async fn increment_download_count(&self, id: RecordId) -> Result<()> {
        sqlx::query(
            "UPDATE publications SET download_count = download_count + 1 WHERE id = ? AND status = 'available'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to increment download count: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Find records whose file name contains `needle` (ASCII case-insensitive)
    pub async fn search_records(&self, needle: &str) -> Result<Vec<PublicationRecord>> {
        let pattern = format!("%{}%", escape_like(needle));

        let rows = sqlx::query_as::<_, PublicationRecord>(&format!(
            r#"
            SELECT {} FROM publications
            WHERE file_name LIKE ? ESCAPE '\'
            ORDER BY file_name ASC, version DESC
            "#,
            RECORD_COLUMNS
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to search publications: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List records newest first
    pub async fn list_records(&self, limit: i64, offset: i64) -> Result<Vec<PublicationRecord>> {
        let rows = sqlx::query_as::<_, PublicationRecord>(&format!(
            r#"
            SELECT {} FROM publications
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
            RECORD_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list publications: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Count all records
    pub async fn count_records(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM publications")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count publications: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    /// Count records with a given status
    pub async fn count_records_by_status(&self, status: Status) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM publications WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count publications by status: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}

/// Escape LIKE wildcards so the needle matches literally
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
