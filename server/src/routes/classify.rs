//! `POST /classify`: multipart upload in, ranked labels out

use std::time::Instant;

use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use recycle_edge::InferenceResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ApiError;
use crate::state::AppState;

/// Name of the multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Default, Deserialize)]
pub struct ClassifyParams {
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifyResponse {
    #[serde(flatten)]
    pub result: InferenceResult,
    /// Wall-clock time spent classifying, in milliseconds
    pub latency_ms: f64,
}

pub async fn classify(
    State(state): State<AppState>,
    Query(params): Query<ClassifyParams>,
    multipart: Multipart,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let image = read_image_field(multipart).await?;
    let response = classify_upload(&state, image, params.top_k).await?;
    Ok(Json(response))
}

/// Bytes of the first `image` field; other fields are skipped
pub async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from_multipart)?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ApiError::bad_request(
        "missing_field",
        format!("multipart field '{}' is required", IMAGE_FIELD),
    ))
}

pub async fn classify_upload(
    state: &AppState,
    image: Vec<u8>,
    top_k: Option<usize>,
) -> Result<ClassifyResponse, ApiError> {
    let top_k = top_k.unwrap_or(state.default_top_k);
    if top_k == 0 {
        return Err(ApiError::bad_request("invalid_top_k", "top_k must be at least 1"));
    }

    let size = image.len();
    let start = Instant::now();
    let result = state
        .service
        .classify_with_timeout(image, state.timeout)
        .await?;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    debug!(
        "Upload of {} bytes → '{}' ({:.3}) in {:.2}ms",
        size, result.label, result.score, latency_ms
    );

    Ok(ClassifyResponse {
        result: result.truncate(top_k),
        latency_ms,
    })
}
