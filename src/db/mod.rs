//! Database layer for file-publish
//!
//! Handles SQLite persistence for publication records, the durable publish
//! job queue, and publish tokens.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`records`] - Publication record admission, finalization and queries
//! - [`jobs`] - Durable job queue (claim, release, acknowledge)
//! - [`tokens`] - Publish token storage

use crate::types::{FileView, RecordId, SearchEntry, Status};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::{Path, PathBuf};

mod jobs;
mod migrations;
mod records;
mod tokens;

/// New publication to be admitted
#[derive(Debug, Clone)]
pub struct NewPublication {
    /// Base name of the source file
    pub file_name: String,
    /// Repository directory the file belongs to
    pub repo_path: String,
    /// Explicit version, or None for the next unused one
    pub version: Option<i64>,
    /// Owner of the source file
    pub owner: String,
    /// Contact address shown to downloaders
    pub contact: Option<String>,
    /// Notification address for the publish result
    pub email: Option<String>,
    /// Absolute path of the source file, carried by the job
    pub source_path: String,
}

/// Publication record from database
#[derive(Debug, Clone, FromRow)]
pub struct PublicationRecord {
    /// Unique record ID
    pub id: RecordId,
    /// Base name of the source file
    pub file_name: String,
    /// Versioned name inside the public folder
    pub stored_file_name: String,
    /// Repository directory the file belongs to
    pub repo_path: String,
    /// Published version (>= 1)
    pub version: i64,
    /// Size in bytes, set by the worker
    pub size: Option<i64>,
    /// Lowercase hex MD5, set by the worker
    pub hash: Option<String>,
    /// Status text ("pending", "available", "error")
    pub status: String,
    /// Failure reason when status is "error"
    pub error_message: Option<String>,
    /// Owner of the source file at publish time
    pub owner: String,
    /// Contact address shown to downloaders
    pub contact: Option<String>,
    /// Notification address for the publish result
    pub email: Option<String>,
    /// Unix timestamp of the terminal transition
    pub publishing_date: Option<i64>,
    /// Completed downloads
    pub download_count: i64,
    /// Unix timestamp of admission
    pub created_at: i64,
}

impl PublicationRecord {
    /// Parsed status
    pub fn status(&self) -> Status {
        Status::from_db(&self.status)
    }

    /// Location of the published artifact
    pub fn published_path(&self, public_dir_name: &str) -> PathBuf {
        Path::new(&self.repo_path)
            .join(public_dir_name)
            .join(&self.stored_file_name)
    }

    /// Projection returned by the view endpoint
    pub fn to_view(&self) -> FileView {
        FileView {
            contact: self.contact.clone(),
            owner: self.owner.clone(),
            status: self.status(),
            file_name: self.file_name.clone(),
            version: self.version,
            size: self.size,
            hash: self.hash.clone(),
            publishing_date: self
                .publishing_date
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
        }
    }

    /// Projection returned by search and listing
    pub fn to_search_entry(&self) -> SearchEntry {
        SearchEntry {
            uri: self.id,
            file_name: self.file_name.clone(),
            size: self.size,
            version: self.version,
            downloads: self.download_count,
            status: self.status(),
        }
    }
}

/// Admitted publish job from the queue table
#[derive(Debug, Clone, FromRow)]
pub struct PublishJob {
    /// Queue row ID
    pub id: i64,
    /// Record this job finalizes
    pub record_id: RecordId,
    /// Source path resolved at admission
    pub source_path: String,
    /// Number of times the job has been claimed (including the current claim)
    pub attempts: i64,
    /// Worker currently holding the job
    pub claimed_by: Option<String>,
    /// Unix timestamp of the current claim
    pub claimed_at: Option<i64>,
    /// Unix timestamp before which the job is not handed out
    pub available_at: i64,
    /// Unix timestamp of admission
    pub created_at: i64,
}

/// Publish token record from database
#[derive(Debug, Clone, FromRow)]
pub struct TokenRecord {
    /// Opaque token value
    pub id: String,
    /// User the token was issued to
    pub username: String,
    /// Unix timestamp of issuance
    pub created_at: i64,
    /// Unix timestamp after which the token is refused
    pub expires_at: i64,
}

/// Database handle for file-publish
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
