//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`publish`] - Publish request admission
//! - [`files`] - View, download, search and listing
//! - [`system`] - Health, events, OpenAPI

use crate::types::{FileView, RecordId, SearchEntry};
use serde::{Deserialize, Serialize};

mod files;
mod publish;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use files::*;
pub use publish::*;
pub use system::*;

/// Message returned with every accepted publish request
pub const PUBLISH_ACCEPTED_MESSAGE: &str = "File registering. It should be ready soon";

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Body of POST /publish
///
/// Only documents the accepted shape; the handler reads the raw body so that
/// every validation failure maps to its own message.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PublishBody {
    /// Publish token
    pub token: String,
    /// Absolute path of the file to publish
    pub path: String,
    /// Requested version, an integer > 0 (next free version when omitted)
    #[schema(value_type = Option<i64>)]
    pub version: Option<serde_json::Value>,
    /// Notification address for the publish result
    pub email: Option<String>,
    /// Contact address shown to downloaders
    pub contact: Option<String>,
}

/// Query parameters for GET /search
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SearchQuery {
    /// Substring to look for in file names (case-insensitive)
    pub file: Option<String>,
}

/// Query parameters for GET /list
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ListQuery {
    /// Number of records to skip (default: 0)
    pub offset: Option<i64>,
    /// Maximum number of records to return (default: 50, max: 100)
    pub limit: Option<i64>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Response of an accepted publish request
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PublishResponse {
    /// Always [`PUBLISH_ACCEPTED_MESSAGE`]
    pub message: String,
    /// Identifier to use with /view and /download
    pub file_id: RecordId,
}

/// Response of GET /view/:id
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ViewResponse {
    /// The publication
    pub file: FileView,
}

/// Response of GET /search
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SearchResponse {
    /// Matching publications
    pub data: Vec<SearchEntry>,
}
