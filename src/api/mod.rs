//! REST API server module
//!
//! Provides an OpenAPI 3 compliant REST API for publishing repository files
//! and for viewing, searching and downloading published versions.

use crate::{Config, Publisher, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// All routes are mounted under `/api`.
///
/// ## Publishing
/// - `POST /api/publish` - Request publication of a repository file
///
/// ## Published Files
/// - `GET /api/view/:id` - Get a single publication
/// - `GET /api/download/:id` - Download a published artifact
/// - `GET /api/search?file=` - Search publications by file name
/// - `GET /api/list?offset=&limit=` - Page through publications
///
/// ## System
/// - `GET /api/health` - Health check
/// - `GET /api/openapi.json` - OpenAPI specification
/// - `GET /api/events` - Server-sent events stream
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(publisher: Arc<Publisher>, config: Arc<Config>) -> Router {
    let state = AppState::new(publisher, config.clone());

    let api = Router::new()
        // Publishing
        .route("/publish", post(routes::publish))
        // Published files
        .route("/view/:id", get(routes::view_file))
        .route("/download/:id", get(routes::download_file))
        .route("/search", get(routes::search_files))
        .route("/list", get(routes::list_files))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    let router = Router::new().nest("/api", api);

    // Swagger UI serves its own copy of the document so it cannot clash with /api/openapi.json
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. All methods and headers are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server fails or the surrounding task is dropped.
///
/// # Example
///
/// ```no_run
/// use file_publish::{Config, Publisher};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let publisher = Arc::new(Publisher::new((*config).clone()).await?);
/// publisher.start_workers();
///
/// // Start API server (blocks until shutdown)
/// file_publish::api::start_api_server(publisher, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(publisher: Arc<Publisher>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(publisher, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
