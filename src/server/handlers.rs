//! Request handlers for the worker's three endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::Authorized;
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::config::ResponseMode;
use crate::task::{ProcessRequest, StatusReport, TaskId, TaskStatus};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probe the encoder; problems are reported in the body, never as an HTTP error
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let response = match state.encoder.version().await {
        Ok(version) => HealthResponse {
            ok: true,
            ffmpeg: Some(version),
            error: None,
        },
        Err(error) => HealthResponse {
            ok: false,
            ffmpeg: None,
            error: Some(format!("{error:#}")),
        },
    };
    Json(response)
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub task_id: String,
}

pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Json<StatusReport> {
    let task = query
        .task_id
        .parse::<TaskId>()
        .ok()
        .and_then(|id| state.pipeline.store().get(&id));

    let report = match task {
        Some(task) => StatusReport::Found(task),
        None => {
            debug!("Status requested for unknown task: {}", query.task_id);
            StatusReport::not_found(query.task_id)
        }
    };
    Json(report)
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ProcessResponse {
    Accepted { task_id: TaskId, status: TaskStatus },
    Finished { ok: bool },
}

pub async fn process(
    State(state): State<AppState>,
    _auth: Authorized,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessResponse>> {
    if request.input_url.trim().is_empty() || request.upload_url.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "input_url and upload_url are required".to_string(),
        ));
    }

    match state.mode {
        ResponseMode::Async => {
            let task_id = state.pipeline.submit(request);
            info!("➕ Accepted task: {}", task_id);
            Ok(Json(ProcessResponse::Accepted {
                task_id,
                status: TaskStatus::Processing,
            }))
        }
        ResponseMode::Sync => {
            let (task_id, result) = state.pipeline.run(&request).await;
            info!("Finished task {} synchronously", task_id);
            result?;
            Ok(Json(ProcessResponse::Finished { ok: true }))
        }
    }
}
