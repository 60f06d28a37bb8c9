//! Submission endpoint: validate, rate-limit, enqueue

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use jobstore::Job;

use super::limiter::{RateDecision, RateLimiter};
use crate::queue::QueueClient;

/// Shared state for admission handlers
pub struct AdmissionState {
    pub queue: Arc<dyn QueueClient>,
    pub limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    #[serde(rename = "jobId")]
    pub job_id: String,
}

/// Build the admission router (shared by every worker task)
pub fn router(state: Arc<AdmissionState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/task", post(submit_task))
        .layer(Extension(state))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn submit_task(
    Extension(state): Extension<Arc<AdmissionState>>,
    Json(req): Json<SubmitRequest>,
) -> axum::response::Response {
    let user_id = match req.user_id.as_deref() {
        Some(user_id) if !user_id.is_empty() => user_id,
        _ => return json_error(StatusCode::BAD_REQUEST, "user_id is required"),
    };

    if let RateDecision::Limited { retry_after } = state.limiter.check(user_id).await {
        warn!(
            user_id,
            retry_after_ms = retry_after.as_millis() as u64,
            "Submission rate limited"
        );
        return json_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }

    let job = Job::new(user_id);
    let job_id = job.job_id.clone();

    match state.queue.enqueue(job).await {
        Ok(()) => {
            info!(job_id = %job_id, user_id, "Task queued");
            (
                StatusCode::OK,
                Json(SubmitResponse {
                    message: "Task queued".to_string(),
                    job_id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(user_id, error = %e, "Enqueue failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "queue unavailable")
        }
    }
}

fn json_error(status: StatusCode, message: &'static str) -> axum::response::Response {
    (status, Json(json!({ "error": message }))).into_response()
}
