//! Read-path handlers: view, download, search, list.

use super::{ListQuery, SearchQuery, SearchResponse, ViewResponse};
use crate::api::AppState;
use crate::error::Error;
use crate::types::FileListing;
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

/// Page size used by GET /list when no limit is given
const DEFAULT_LIST_LIMIT: i64 = 50;

/// GET /view/:id - Get a single publication
#[utoipa::path(
    get,
    path = "/api/view/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "Publication ID")
    ),
    responses(
        (status = 200, description = "Publication details", body = ViewResponse),
        (status = 404, description = "Unknown publication (empty object)")
    )
)]
pub async fn view_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ViewResponse>, Error> {
    let file = state.publisher.view(&id).await?;
    Ok(Json(ViewResponse { file }))
}

/// GET /download/:id - Stream a published artifact
#[utoipa::path(
    get,
    path = "/api/download/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "Publication ID")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown or unavailable publication (empty object)")
    )
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let download = state.publisher.download(&id).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace('\\', "\\\\").replace('"', "\\\"")
    );
    let disposition = HeaderValue::from_bytes(disposition.as_bytes())
        .map_err(|e| Error::Other(format!("invalid file name for Content-Disposition: {}", e)))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, disposition);
    if let Some(size) = download.size {
        builder = builder.header(header::CONTENT_LENGTH, size);
    }

    builder
        .body(Body::from_stream(download.stream))
        .map_err(|e| Error::Other(format!("failed to build download response: {}", e)))
}

/// GET /search - Find publications by file name
#[utoipa::path(
    get,
    path = "/api/search",
    tag = "files",
    params(
        ("file" = String, Query, description = "Substring to look for in file names")
    ),
    responses(
        (status = 200, description = "Matching publications (possibly empty)", body = SearchResponse),
        (status = 400, description = "Missing file parameter", body = crate::error::ApiError)
    )
)]
pub async fn search_files(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, Error> {
    let Some(needle) = query.file.filter(|f| !f.is_empty()) else {
        return Err(Error::Validation("Missing file".to_string()));
    };

    let data = state.publisher.search(&needle).await?;
    Ok(Json(SearchResponse { data }))
}

/// GET /list - Page through all publications, newest first
#[utoipa::path(
    get,
    path = "/api/list",
    tag = "files",
    params(
        ("offset" = Option<i64>, Query, description = "Number of records to skip"),
        ("limit" = Option<i64>, Query, description = "Maximum number of records to return (max 100)")
    ),
    responses(
        (status = 200, description = "One page of publications", body = FileListing)
    )
)]
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FileListing>, Error> {
    let listing = state
        .publisher
        .list(
            query.offset.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        )
        .await?;
    Ok(Json(listing))
}
