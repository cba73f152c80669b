//! Runtime log filter routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
}

/// Create the logging router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

async fn get_logging_config(State(state): State<AppState>) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
    }))
}

async fn update_logging_config(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))?;

    logging_config.set_filter(&request.filter)?;

    Ok(Json(LoggingConfigResponse {
        filter: logging_config.get_filter(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaTools;
    use crate::pipeline::{EngineConfig, TaskEngine};
    use crate::shares::{ShareDetails, ShareResolver};
    use crate::status::StatusReporter;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct NoShares;

    #[async_trait]
    impl ShareResolver for NoShares {
        async fn get_share_details(&self, _share_id: &str) -> crate::Result<Option<ShareDetails>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_filter_unavailable_without_logging() {
        let engine = Arc::new(TaskEngine::new(EngineConfig::default(), StatusReporter::noop()));
        let state = AppState::new(engine, Arc::new(NoShares), MediaTools::default());
        let app = Router::new().nest("/logging", router()).with_state(state);

        let response = app
            .oneshot(Request::get("/logging").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
