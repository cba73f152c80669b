//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::LivenessResponse;
use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/live", get(liveness_check))
}

/// Liveness check - is the process up?
async fn liveness_check(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
