//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the file-publish REST
//! API using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the file-publish REST API
///
/// The spec can be accessed via:
/// - `/api/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "file-publish REST API",
        version = "0.1.0",
        description = "Publish versioned copies of repository files and serve them for download",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server")
    ),
    paths(
        // Publishing
        crate::api::routes::publish,

        // Published files
        crate::api::routes::view_file,
        crate::api::routes::download_file,
        crate::api::routes::search_files,
        crate::api::routes::list_files,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::RecordId,
        crate::types::Status,
        crate::types::FileView,
        crate::types::SearchEntry,
        crate::types::FileListing,
        crate::types::Event,

        // Request/response types from routes
        crate::api::routes::PublishBody,
        crate::api::routes::PublishResponse,
        crate::api::routes::ViewResponse,
        crate::api::routes::SearchResponse,
        crate::api::routes::SearchQuery,
        crate::api::routes::ListQuery,

        // Error types
        crate::error::ApiError,
    )),
    tags(
        (name = "publish", description = "Publication requests"),
        (name = "files", description = "Viewing, searching and downloading published files"),
        (name = "system", description = "Health, documentation and event stream")
    )
)]
pub struct ApiDoc;
