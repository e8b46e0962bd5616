//! Core types for file-publish

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a publication record
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct RecordId(#[schema(value_type = String)] pub uuid::Uuid);

impl RecordId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse an identifier received from a client
    ///
    /// Returns `None` for anything that is not a UUID, so that callers can
    /// treat malformed ids exactly like unknown ones.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

// Stored as hyphenated TEXT so the database stays readable with the sqlite3 shell
impl sqlx::Type<sqlx::Sqlite> for RecordId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RecordId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode(self.to_string(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RecordId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(uuid::Uuid::parse_str(text)?))
    }
}

/// Publication status
///
/// `Pending` moves to exactly one of the two terminal states and never back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Admitted, waiting for a worker
    Pending,
    /// Published and downloadable
    Available,
    /// Publish failed
    Error,
}

impl Status {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Available => "available",
            Status::Error => "error",
        }
    }

    /// Parse the database representation
    ///
    /// Unknown values are treated as `Error` so that they are never served.
    pub fn from_db(value: &str) -> Self {
        match value {
            "pending" => Status::Pending,
            "available" => Status::Available,
            _ => Status::Error,
        }
    }

    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Pending)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result a worker reports back into the store for one job
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The artifact is in place
    Available {
        /// Size in bytes of the published artifact
        size: u64,
        /// Lowercase hex MD5 of the published artifact
        hash: String,
    },
    /// The publish failed for good
    Error {
        /// Human-readable failure reason
        reason: String,
    },
}

/// Full projection of a record returned by the view endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileView {
    /// Contact address given at publish time
    pub contact: Option<String>,
    /// Owner of the source file at publish time
    pub owner: String,
    /// Current status
    pub status: Status,
    /// Original file name
    pub file_name: String,
    /// Published version
    pub version: i64,
    /// Size in bytes (None while pending)
    pub size: Option<i64>,
    /// MD5 digest (None while pending)
    pub hash: Option<String>,
    /// When the record reached a terminal status
    pub publishing_date: Option<DateTime<Utc>>,
}

/// One search hit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchEntry {
    /// Record identifier, used as the download/view URI component
    pub uri: RecordId,
    /// Original file name
    pub file_name: String,
    /// Size in bytes (None while pending)
    pub size: Option<i64>,
    /// Published version
    pub version: i64,
    /// Number of completed downloads
    pub downloads: i64,
    /// Current status
    pub status: Status,
}

/// One page of the record listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileListing {
    /// Records on this page, newest first
    pub files: Vec<SearchEntry>,
    /// Total number of records
    pub total: i64,
}

/// Event emitted by the publisher
///
/// Consumers subscribe via [`Publisher::subscribe()`](crate::Publisher::subscribe).
/// `Available` and `Failed` carry the notification address given at publish
/// time so that an embedding application can deliver mail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A publish request was admitted
    Queued {
        /// Record ID
        id: RecordId,
        /// Original file name
        file_name: String,
        /// Resolved version
        version: i64,
    },

    /// A worker started moving the file
    Publishing {
        /// Record ID
        id: RecordId,
        /// Whether the link or copy strategy was chosen
        strategy: String,
    },

    /// The file is published
    Available {
        /// Record ID
        id: RecordId,
        /// Size in bytes
        size: u64,
        /// MD5 digest
        hash: String,
        /// Notification address, if one was given
        email: Option<String>,
    },

    /// The publish failed
    Failed {
        /// Record ID
        id: RecordId,
        /// Failure reason
        reason: String,
        /// Notification address, if one was given
        email: Option<String>,
    },

    /// The publisher is shutting down
    Shutdown,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_text() {
        for status in [Status::Pending, Status::Available, Status::Error] {
            assert_eq!(Status::from_db(status.as_str()), status);
        }
        assert_eq!(Status::from_db("garbage"), Status::Error);
    }

    #[test]
    fn only_pending_is_not_terminal() {
        assert!(!Status::Pending.is_terminal());
        assert!(Status::Available.is_terminal());
        assert!(Status::Error.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Status::Available).unwrap(), "available");
    }

    #[test]
    fn record_id_rejects_non_uuid() {
        assert!(RecordId::parse("XXX").is_none());
        let id = RecordId::parse("f2ecc13f-3038-4f78-8c84-ab881a0b567d").unwrap();
        assert_eq!(id.to_string(), "f2ecc13f-3038-4f78-8c84-ab881a0b567d");
    }

    #[test]
    fn record_id_serializes_as_plain_string() {
        let id = RecordId::new();
        assert_eq!(serde_json::to_value(id).unwrap(), serde_json::json!(id.to_string()));
    }

    #[test]
    fn event_is_tagged() {
        let event = Event::Failed {
            id: RecordId::new(),
            reason: "disk full".into(),
            email: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "failed");
        assert_eq!(value["reason"], "disk full");
    }
}
