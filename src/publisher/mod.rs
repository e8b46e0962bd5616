//! Publish pipeline split into focused submodules.
//!
//! The `Publisher` struct and its methods are organized by domain:
//! - [`auth`] - Publish token verification
//! - [`coordinator`] - Request validation and admission
//! - [`worker`] - Job consumption and record finalization
//! - [`strategy`] - Link and copy filesystem transitions
//! - [`query`] - View, download, search and listing
//! - [`lifecycle`] - Startup recovery and shutdown coordination

pub mod auth;
mod coordinator;
mod lifecycle;
mod query;
pub mod strategy;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use auth::{DatabaseTokenVerifier, TokenStatus, TokenVerifier};
pub use coordinator::{PublishAccepted, PublishRequest};
pub use query::Download;
pub use strategy::PublishStrategy;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::types::{Event, RecordId};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Worker pool coordination state
#[derive(Clone)]
pub(crate) struct WorkerState {
    /// Woken on every admission so idle workers claim immediately
    pub(crate) wake: Arc<tokio::sync::Notify>,
    /// Cancelled on shutdown; workers stop claiming new jobs
    pub(crate) shutdown: tokio_util::sync::CancellationToken,
    /// Records currently being published by this process
    pub(crate) active_jobs: Arc<tokio::sync::Mutex<HashSet<RecordId>>>,
    /// Flag to indicate whether new publications are accepted (false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Distinguishes this process's claims from those of a previous run
    pub(crate) instance_id: String,
}

/// Main publisher instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Publisher {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query record status
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Token verification (trait object so embedders can plug in their own issuer)
    pub(crate) token_verifier: Arc<dyn TokenVerifier>,
    /// Worker pool coordination
    pub(crate) worker_state: WorkerState,
}

impl Publisher {
    /// Create a new Publisher instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Opens/creates the SQLite database and runs migrations
    /// - Releases job claims left over from a previous run
    /// - Sets up the event broadcast channel
    ///
    /// Workers are not started; call [`start_workers`](Self::start_workers).
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let token_verifier: Arc<dyn TokenVerifier> =
            Arc::new(DatabaseTokenVerifier::new(db.clone()));

        let worker_state = WorkerState {
            wake: Arc::new(tokio::sync::Notify::new()),
            shutdown: tokio_util::sync::CancellationToken::new(),
            active_jobs: Arc::new(tokio::sync::Mutex::new(HashSet::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            instance_id: uuid::Uuid::new_v4().simple().to_string(),
        };

        let publisher = Self {
            db,
            event_tx,
            config: Arc::new(config),
            token_verifier,
            worker_state,
        };

        publisher.recover().await?;

        Ok(publisher)
    }

    /// Replace the token verifier
    ///
    /// Tokens are checked against the `tokens` table by default.
    pub fn with_token_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.token_verifier = verifier;
        self
    }

    /// Subscribe to publish events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than 1000 events receives
    /// `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use file_publish::{Config, Event, Publisher};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let publisher = Publisher::new(Config::default()).await?;
    ///
    ///     let mut events = publisher.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             if let Event::Available { email: Some(to), id, .. } = event {
    ///                 println!("notify {} that {} is published", to, id);
    ///             }
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server listens on the configured bind address (default: 127.0.0.1:5000).
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let publisher = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(publisher, config).await })
    }
}
