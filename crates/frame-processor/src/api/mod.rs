pub mod routes;

use crate::state::FrameProcessorState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// Build the API router
pub fn router(state: FrameProcessorState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Frame endpoints
        .route("/v1/frames", post(routes::submit_frames))
        .route("/v1/preview", post(routes::preview_frame))
        // Base64 frames in a full batch exceed axum's default body limit
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
