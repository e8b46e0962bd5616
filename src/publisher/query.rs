//! Read path: view, download, search and listing.

use crate::db::{Database, PublicationRecord};
use crate::error::{Error, Result};
use crate::types::{FileListing, FileView, RecordId, SearchEntry, Status};
use crate::utils::IO_BUFFER_SIZE;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::Publisher;

/// Largest page the listing returns
pub const MAX_LIST_LIMIT: i64 = 100;

/// An available artifact ready to be streamed to a client
pub struct Download {
    /// Versioned name of the artifact, for `Content-Disposition`
    pub file_name: String,
    /// Size in bytes as recorded at publish time
    pub size: Option<u64>,
    /// File content; the download counter is bumped once the last byte
    /// has been read without error
    pub stream: BoxStream<'static, std::io::Result<Bytes>>,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("file_name", &self.file_name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Look up a record for the view endpoint
    ///
    /// Unknown and malformed ids are both `NotFound`.
    pub async fn view(&self, id: &str) -> Result<FileView> {
        Ok(self.find_record(id).await?.to_view())
    }

    /// Open an available artifact for streaming
    ///
    /// Records that are pending or failed, and artifacts missing from disk,
    /// are reported as `NotFound`.
    pub async fn download(&self, id: &str) -> Result<Download> {
        let record = self.find_record(id).await?;
        if record.status() != Status::Available {
            return Err(Error::NotFound(format!("publication {} is not available", record.id)));
        }

        let path = record.published_path(&self.config.storage.public_dir_name);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    record_id = %record.id,
                    path = %path.display(),
                    "Published artifact is missing from disk"
                );
                return Err(Error::NotFound(format!("publication {} has no artifact", record.id)));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let expected = match record.size.and_then(|s| u64::try_from(s).ok()) {
            Some(size) => size,
            None => file.metadata().await.map_err(Error::Io)?.len(),
        };

        // An empty artifact is complete once the headers are out
        if expected == 0 {
            count_download(self.db.clone(), record.id);
        }

        // Count on the chunk that carries the last byte. With a Content-Length
        // the server never polls the body past that chunk.
        let mut counter = (expected > 0).then(|| self.db.clone());
        let mut sent = 0u64;
        let record_id = record.id;
        let stream = ReaderStream::with_capacity(file, IO_BUFFER_SIZE).map(move |chunk| {
            match &chunk {
                Ok(bytes) => {
                    sent += bytes.len() as u64;
                    if sent >= expected
                        && let Some(db) = counter.take()
                    {
                        count_download(db, record_id);
                    }
                }
                Err(e) => {
                    if counter.take().is_some() {
                        tracing::warn!(record_id = %record_id, error = %e, "Download aborted by read error, not counted");
                    }
                }
            }
            chunk
        });

        Ok(Download {
            file_name: record.stored_file_name.clone(),
            size: Some(expected),
            stream: stream.boxed(),
        })
    }

    /// Case-insensitive substring search over file names
    pub async fn search(&self, needle: &str) -> Result<Vec<SearchEntry>> {
        let records = self.db.search_records(needle).await?;
        Ok(records.iter().map(PublicationRecord::to_search_entry).collect())
    }

    /// One page of records, newest first
    ///
    /// `limit` is clamped to [`MAX_LIST_LIMIT`] and negative values are treated as 0.
    pub async fn list(&self, offset: i64, limit: i64) -> Result<FileListing> {
        let limit = limit.clamp(0, MAX_LIST_LIMIT);
        let offset = offset.max(0);

        let records = self.db.list_records(limit, offset).await?;
        let total = self.db.count_records().await?;

        Ok(FileListing {
            files: records.iter().map(PublicationRecord::to_search_entry).collect(),
            total,
        })
    }

    async fn find_record(&self, id: &str) -> Result<PublicationRecord> {
        let not_found = || Error::NotFound(format!("publication {}", id));
        let record_id = RecordId::parse(id).ok_or_else(not_found)?;
        self.db.get_record(record_id).await?.ok_or_else(not_found)
    }
}

fn count_download(db: Arc<Database>, record_id: RecordId) {
    tokio::spawn(async move {
        if let Err(e) = db.increment_download_count(record_id).await {
            tracing::warn!(record_id = %record_id, error = %e, "Failed to count download");
        }
    });
}
