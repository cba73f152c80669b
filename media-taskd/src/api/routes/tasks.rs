//! Task submission routes.

use axum::extract::rejection::JsonRejection;
use axum::{Json, Router, extract::State, routing::get, routing::post};
use serde_json::json;
use tracing::{error, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{QueueStatusResponse, SubmitResponse};
use crate::api::server::AppState;
use crate::pipeline::{TaskSubmission, prepare_job};

/// Create the tasks router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_task))
        .route("/queue", get(queue_status))
}

/// Accept a task and queue it. Does not wait for the task to run.
async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<TaskSubmission>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(submission) = payload.map_err(|rejection| {
        ApiError::validation("invalid task information provided")
            .with_details(json!({ "reason": rejection.body_text() }))
    })?;

    let job = prepare_job(&submission, state.shares.as_ref(), &state.tools)
        .await
        .inspect_err(|e| {
            error!(
                task_id = %submission.task_id,
                task_name = %submission.task_name,
                error = %e,
                "Rejecting task"
            );
        })?;

    let priority = submission.effective_priority(job.kind(), &state.engine.config().priority);
    let task_id = job.task_id().to_string();
    let priority = state.engine.submit(job, Some(priority))?;
    info!(task_id = %task_id, priority, "Task accepted");

    Ok(Json(SubmitResponse { ok: true }))
}

async fn queue_status(State(state): State<AppState>) -> Json<QueueStatusResponse> {
    Json(QueueStatusResponse {
        queued: state.engine.size(),
        active: state.engine.active_count(),
        max_concurrent_tasks: state.engine.config().max_concurrent_tasks,
    })
}
