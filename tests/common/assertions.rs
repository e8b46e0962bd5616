//! Event-driven waits for integration tests

use file_publish::{Event, Publisher, RecordId};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

/// Result of waiting for a publication to finish
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// The file was published with this size and digest
    Available {
        /// Size in bytes
        size: u64,
        /// MD5 digest
        hash: String,
    },
    /// The publish failed
    Failed(String),
    /// Timeout waiting for an outcome
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for the terminal event of one publication
///
/// Subscribe before admitting the request so that no event is missed.
pub async fn wait_for_outcome(
    events: &mut Receiver<Event>,
    id: RecordId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Available {
                    id: event_id,
                    size,
                    hash,
                    ..
                }) if event_id == id => {
                    return WaitResult::Available { size, hash };
                }
                Ok(Event::Failed {
                    id: event_id,
                    reason,
                    ..
                }) if event_id == id => {
                    return WaitResult::Failed(reason);
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Poll the download counter of a record until it reaches `expected`
///
/// Returns the last observed count.
pub async fn wait_for_downloads(
    publisher: &Publisher,
    id: RecordId,
    expected: i64,
    timeout: Duration,
) -> i64 {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let count = publisher
            .db
            .get_record(id)
            .await
            .expect("get record")
            .expect("record exists")
            .download_count;
        if count >= expected || tokio::time::Instant::now() > deadline {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
