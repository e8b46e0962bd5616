//! Application state for the API server

use crate::{Config, Publisher};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the publisher instance and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The main Publisher instance
    pub publisher: Arc<Publisher>,

    /// Configuration (read-only for handlers)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(publisher: Arc<Publisher>, config: Arc<Config>) -> Self {
        Self { publisher, config }
    }
}
