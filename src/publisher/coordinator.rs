//! Publish request validation and admission.

use crate::db::NewPublication;
use crate::error::{AuthFailure, Error, Result};
use crate::types::{Event, RecordId};
use crate::utils;
use serde_json::{Map, Value};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::Ordering;

use super::{Publisher, TokenStatus};

/// Message returned for malformed email or contact addresses
pub(crate) const INVALID_EMAIL: &str =
    "The email address is not valid. It must have exactly one @-sign.";

/// A publish request as received from a client
///
/// Fields are kept loosely typed: a field with the wrong JSON type is
/// reported by the validation step responsible for it, in order.
#[derive(Clone, Debug, Default)]
pub struct PublishRequest {
    /// Publish token
    pub token: Option<String>,
    /// Absolute path of the file to publish
    pub path: Option<String>,
    /// Requested version (integer or string holding an integer)
    pub version: Option<Value>,
    /// Notification address for the publish result
    pub email: Option<String>,
    /// Contact address shown to downloaders
    pub contact: Option<String>,
}

impl PublishRequest {
    /// Parse a raw request body
    ///
    /// # Errors
    ///
    /// `Validation("Missing body")` when the body is empty, an empty JSON
    /// object, or not a JSON object at all.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(missing_body());
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) if !map.is_empty() => Ok(Self::from_map(&map)),
            _ => Err(missing_body()),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            token: text("token"),
            path: text("path"),
            version: map.get("version").filter(|v| !v.is_null()).cloned(),
            email: text("email"),
            contact: text("contact"),
        }
    }
}

fn missing_body() -> Error {
    Error::Validation("Missing body".to_string())
}

/// Result of a successful admission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishAccepted {
    /// Identifier of the pending record
    pub file_id: RecordId,
    /// Version the record was admitted with
    pub version: i64,
}

/// What admission learned about the source file
#[derive(Debug)]
struct SourceInfo {
    path: PathBuf,
    file_name: String,
    repo_path: PathBuf,
    owner: String,
}

impl Publisher {
    /// Validate and admit a publish request
    ///
    /// Checks run in a fixed order and the first failure is returned; no
    /// record or job exists when this returns an error. On success the record
    /// is `pending`, its job is queued, and the workers have been woken. The
    /// file itself is published asynchronously.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishAccepted> {
        if !self.worker_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let username = self.authorize(request.token.as_deref()).await?;

        let Some(path) = request.path.clone() else {
            return Err(Error::Validation("Missing path".to_string()));
        };

        let storage = self.config.storage.clone();
        let source = tokio::task::spawn_blocking(move || {
            inspect_source(&path, &storage.repositories, &storage.public_dir_name)
        })
        .await
        .map_err(|e| Error::Other(format!("source inspection task failed: {}", e)))??;

        let version = request.version.as_ref().map(parse_version).transpose()?;

        for address in [&request.email, &request.contact].into_iter().flatten() {
            if !utils::is_valid_email(address) {
                return Err(Error::Validation(INVALID_EMAIL.to_string()));
            }
        }

        let new = NewPublication {
            file_name: source.file_name,
            repo_path: source.repo_path.to_string_lossy().into_owned(),
            version,
            owner: source.owner,
            contact: request.contact,
            email: request.email,
            source_path: source.path.to_string_lossy().into_owned(),
        };

        let record = self.db.admit_publication(&new).await?;

        tracing::info!(
            record_id = %record.id,
            file_name = %record.file_name,
            version = record.version,
            path = %new.source_path,
            user = %username,
            "Publication admitted"
        );

        self.worker_state.wake.notify_one();
        self.emit_event(Event::Queued {
            id: record.id,
            file_name: record.file_name.clone(),
            version: record.version,
        });

        Ok(PublishAccepted {
            file_id: record.id,
            version: record.version,
        })
    }

    async fn authorize(&self, token: Option<&str>) -> Result<String> {
        let Some(token) = token else {
            return Err(Error::Auth {
                reason: AuthFailure::Missing,
            });
        };

        match self.token_verifier.verify(token).await? {
            TokenStatus::Valid { username } => Ok(username),
            TokenStatus::Expired => {
                tracing::debug!("Rejected expired publish token");
                Err(Error::Auth {
                    reason: AuthFailure::Expired,
                })
            }
            TokenStatus::Unknown => {
                tracing::debug!("Rejected unknown publish token");
                Err(Error::Auth {
                    reason: AuthFailure::Unknown,
                })
            }
        }
    }
}

/// Steps 4 to 6 of validation: existence, file type, repository membership
fn inspect_source(path: &str, repositories: &[PathBuf], public_dir_name: &str) -> Result<SourceInfo> {
    let not_found = || Error::Validation(format!("File not found at path {}", path));

    let raw = Path::new(path);
    if !raw.is_absolute() {
        return Err(not_found());
    }

    // Follows symlinks, so a dangling link counts as missing
    if let Err(e) = std::fs::metadata(raw) {
        return match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory => Err(not_found()),
            _ => Err(Error::Io(e)),
        };
    }

    // Anything but a regular file is refused
    if !std::fs::symlink_metadata(raw)?.is_file() {
        return Err(Error::Validation(
            "Path must not be a folder or a symlink".to_string(),
        ));
    }

    // Resolve `..` and symlinked parents so repository membership cannot be faked
    let (Some(parent), Some(file_name)) = (raw.parent(), raw.file_name()) else {
        return Err(not_found());
    };
    let source = std::fs::canonicalize(parent)?.join(file_name);

    let repo_path = resolve_repository(&source, repositories, public_dir_name)?;
    let owner = utils::file_owner(&source)?;

    Ok(SourceInfo {
        file_name: file_name.to_string_lossy().into_owned(),
        path: source,
        repo_path,
        owner,
    })
}

/// Find the repository a source belongs to
///
/// With configured roots the deepest root containing the source wins;
/// without any, the source's directory is its repository.
fn resolve_repository(source: &Path, repositories: &[PathBuf], public_dir_name: &str) -> Result<PathBuf> {
    let repo = if repositories.is_empty() {
        source
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Validation("File is not inside a publishable repository".to_string()))?
    } else {
        repositories
            .iter()
            .map(|root| std::fs::canonicalize(root).unwrap_or_else(|_| root.clone()))
            .filter(|root| source.starts_with(root) && source != root)
            .max_by_key(|root| root.components().count())
            .ok_or_else(|| Error::Validation("File is not inside a publishable repository".to_string()))?
    };

    let in_public_folder = if repositories.is_empty() {
        repo.file_name().is_some_and(|name| name == public_dir_name)
    } else {
        source
            .strip_prefix(&repo)
            .ok()
            .and_then(|rel| rel.components().next())
            .is_some_and(|first| first == Component::Normal(OsStr::new(public_dir_name)))
    };

    if in_public_folder {
        return Err(Error::Validation(
            "File is already in a public folder".to_string(),
        ));
    }

    Ok(repo)
}

/// Parse a requested version; strings holding an integer are accepted
fn parse_version(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v > 0 => Ok(v),
        _ => {
            let shown = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Err(Error::Validation(format!(
                "Value {} is not an integer > 0",
                shown
            )))
        }
    }
}
