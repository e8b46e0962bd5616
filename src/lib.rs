//! # file-publish
//!
//! Backend library for publishing versioned copies of repository files.
//!
//! A publish request names a file inside a repository. It is validated and
//! admitted synchronously: the request gets back an id while the
//! publication is still `pending`. Workers then move the file into the
//! repository's public folder under a versioned name (`report_v3.pdf`),
//! record its size and MD5 digest, and mark it `available` or `error`.
//! Published files can be viewed, searched and downloaded through the REST API.
//!
//! ## Design Philosophy
//!
//! file-publish is designed to be:
//! - **Durable** - Admitted requests survive restarts in a SQLite job queue
//! - **Library-first** - No CLI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use file_publish::{Config, Publisher, run_with_shutdown};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.storage.repositories = vec!["/srv/repos".into()];
//!
//!     let publisher = Arc::new(Publisher::new(config).await?);
//!     publisher.start_workers();
//!     publisher.spawn_api_server();
//!
//!     // Subscribe to events
//!     let mut events = publisher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     run_with_shutdown(&publisher).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

#[cfg(not(unix))]
compile_error!("file-publish relies on symlinks and POSIX file ownership and only supports unix targets");

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Publish pipeline (decomposed into focused submodules)
pub mod publisher;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, StrategyMode};
pub use db::Database;
pub use error::{ApiError, AuthFailure, DatabaseError, Error, PublishError, Result, ToHttpStatus};
pub use publisher::{
    DatabaseTokenVerifier, Download, PublishAccepted, PublishRequest, PublishStrategy, Publisher,
    TokenStatus, TokenVerifier,
};
pub use types::{Event, FileListing, FileView, PublishOutcome, RecordId, SearchEntry, Status};

/// Helper function to run the publisher with graceful signal handling.
///
/// Waits for SIGTERM or SIGINT and then calls the publisher's `shutdown()`
/// method, with fallbacks if signal registration fails.
///
/// # Example
///
/// ```no_run
/// use file_publish::{Config, Publisher, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let publisher = Publisher::new(Config::default()).await?;
///     publisher.start_workers();
///
///     // Run with automatic signal handling
///     run_with_shutdown(&publisher).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(publisher: &Publisher) -> Result<()> {
    wait_for_signal().await;
    publisher.shutdown().await
}

async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}
