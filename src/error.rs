//! Error types for file-publish
//!
//! This module provides the error taxonomy for the library:
//! - Synchronous admission errors (validation, authentication, conflict)
//! - Read-path errors (not found)
//! - Asynchronous publish execution errors, recorded on the publication record
//! - HTTP status code mapping for API integration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for file-publish operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for file-publish
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input in a publish request
    #[error("{0}")]
    Validation(String),

    /// Missing, unknown or expired token
    ///
    /// The rendered message is the same for every reason so that callers
    /// cannot probe which tokens exist.
    #[error("Missing token in body")]
    Auth {
        /// Why the token was rejected (logged, never returned to clients)
        reason: AuthFailure,
    },

    /// The requested (repository, file, version) identity is already taken
    #[error("Error checking file : {0}")]
    Conflict(String),

    /// Unknown publication id, or a publication that cannot be served yet
    #[error("not found: {0}")]
    NotFound(String),

    /// Publish execution failed (recorded on the record, never returned by admission)
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "storage.public_dir_name")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new publications
    #[error("shutdown in progress: not accepting new publications")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Reason a publish token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No token field in the request
    Missing,
    /// Token not known to the verifier
    Unknown,
    /// Token known but past its expiry
    Expired,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::Missing => write!(f, "missing"),
            AuthFailure::Unknown => write!(f, "unknown"),
            AuthFailure::Expired => write!(f, "expired"),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Errors raised while a worker moves a file into the public tree
#[derive(Debug, Error)]
pub enum PublishError {
    /// Source file disappeared between admission and execution
    #[error("File not found at path {}", path.display())]
    SourceMissing {
        /// The source path that no longer exists
        path: PathBuf,
    },

    /// Source is no longer a regular file
    #[error("Path must not be a folder or a symlink: {}", path.display())]
    SourceNotRegular {
        /// The offending source path
        path: PathBuf,
    },

    /// Something already occupies the destination path
    #[error("destination {} already exists", path.display())]
    DestinationExists {
        /// The occupied destination path
        path: PathBuf,
    },

    /// Not enough room on the destination device for a copy
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the copy
        required: u64,
        /// Number of bytes currently available on the destination device
        available: u64,
    },

    /// The staged copy does not match the source
    #[error("copy of {} is incomplete: expected {expected} bytes, wrote {written}", source_path.display())]
    IncompleteCopy {
        /// The source being copied
        source_path: PathBuf,
        /// Size of the source when the copy started
        expected: u64,
        /// Number of bytes actually staged
        written: u64,
    },

    /// Filesystem operation failed
    #[error("failed to {operation} {}: {source}", path.display())]
    Filesystem {
        /// What was being attempted (e.g., "rename", "symlink", "copy")
        operation: &'static str,
        /// The path the operation was applied to
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The blocking filesystem task panicked or was cancelled
    #[error("publish task aborted: {0}")]
    TaskAborted(String),
}

impl PublishError {
    /// Wrap an I/O error with the operation and path it came from
    pub fn fs(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PublishError::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// API error response format
///
/// Every error the REST API returns carries a single human-readable message:
///
/// ```json
/// { "error": "Missing path" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Human-readable error message
    pub error: String,
}

impl ApiError {
    /// Create a new API error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - rejected at admission
            Error::Validation(_) => 400,
            Error::Conflict(_) => 400,
            Error::Config { .. } => 400,

            // 401 Unauthorized
            Error::Auth { .. } => 401,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Database(DatabaseError::NotFound(_)) => 404,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error - Server-side issues
            Error::Publish(_) => 500,
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Auth { .. } => "unauthorized",
            Error::Conflict(_) => "conflict",
            Error::NotFound(_) => "not_found",
            Error::Publish(e) => match e {
                PublishError::SourceMissing { .. } => "source_missing",
                PublishError::SourceNotRegular { .. } => "source_not_regular",
                PublishError::DestinationExists { .. } => "destination_exists",
                PublishError::InsufficientSpace { .. } => "insufficient_space",
                PublishError::IncompleteCopy { .. } => "incomplete_copy",
                PublishError::Filesystem { .. } => "filesystem_error",
                PublishError::TaskAborted(_) => "task_aborted",
            },
            Error::Config { .. } => "config_error",
            Error::Database(DatabaseError::NotFound(_)) => "not_found",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError::new(error.to_string())
    }
}
