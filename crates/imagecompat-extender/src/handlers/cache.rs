use crate::types::{InvalidateRequest, InvalidateResponse};
use crate::{ApiError, AppState, Result};
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::info;

/// POST /cache/invalidate
///
/// Forget the feature groups recorded for an image so the next Pod using it
/// refetches its compatibility artifact.
pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    let image = request.image.trim();
    if image.is_empty() {
        return Err(ApiError::BadRequest("image must not be empty".to_string()));
    }

    let invalidated = state.cache.invalidate(image).await;
    info!(
        "Cache invalidation requested for image {} (entry present: {})",
        image, invalidated
    );

    Ok(Json(InvalidateResponse {
        image: image.to_string(),
        invalidated,
    }))
}
