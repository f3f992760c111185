use crate::state::FrameProcessorState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::frames::{FrameBatchRequest, FramePackage};
use common::validation::MAX_FRAMES_PER_BATCH;
use face_dedup::FrameError;
use serde_json::json;

/// Submit a batch of frames and wait for per-frame outcomes
pub async fn submit_frames(
    State(state): State<FrameProcessorState>,
    Json(request): Json<FrameBatchRequest>,
) -> impl IntoResponse {
    if request.frames.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "batch contains no frames" })),
        )
            .into_response();
    }
    if request.frames.len() > MAX_FRAMES_PER_BATCH {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({
                "error": format!(
                    "batch contains {} frames, limit is {}",
                    request.frames.len(),
                    MAX_FRAMES_PER_BATCH
                )
            })),
        )
            .into_response();
    }

    match state.submit_batch(request.frames).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to submit frame batch");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Run the preview pass over one frame
pub async fn preview_frame(
    State(state): State<FrameProcessorState>,
    Json(frame): Json<FramePackage>,
) -> impl IntoResponse {
    match state.preview(&frame).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            let status = match &e {
                FrameError::MalformedFrame(_) => StatusCode::UNPROCESSABLE_ENTITY,
                FrameError::RecognitionNotFound(_) => StatusCode::NOT_FOUND,
                FrameError::RecognitionUnavailable(_) | FrameError::PersistenceFailure(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            };
            tracing::warn!(
                frame_seq = frame.frame_sequence_number,
                error = %e,
                "preview failed"
            );
            (
                status,
                Json(json!({ "error": e.to_string(), "kind": e.kind() })),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "frame-processor"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<FrameProcessorState>) -> impl IntoResponse {
    let checks = state.health().await;
    let ready = checks.values().all(|&ok| ok);

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not ready" },
            "collection_id": state.collection_id(),
            "checks": checks
        })),
    )
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
