//! Publish handler.

use super::{PUBLISH_ACCEPTED_MESSAGE, PublishResponse};
use crate::api::AppState;
use crate::error::Error;
use crate::publisher::PublishRequest;
use axum::{Json, body::Bytes, extract::State};

/// POST /publish - Request publication of a repository file
#[utoipa::path(
    post,
    path = "/api/publish",
    tag = "publish",
    request_body(content = super::PublishBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Publication admitted, the file is published asynchronously", body = PublishResponse),
        (status = 400, description = "Invalid request, duplicate version, or file not publishable", body = crate::error::ApiError),
        (status = 401, description = "Missing, unknown or expired token", body = crate::error::ApiError),
        (status = 503, description = "Server is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn publish(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PublishResponse>, Error> {
    let request = PublishRequest::from_body(&body)?;
    let accepted = state.publisher.publish(request).await?;

    Ok(Json(PublishResponse {
        message: PUBLISH_ACCEPTED_MESSAGE.to_string(),
        file_id: accepted.file_id,
    }))
}
