//! Task handlers: start pull/push/publish, query and cancel by key

use crate::error::{ApiError, ApiResult};
use crate::extractors::Authenticated;
use crate::services::OrchestratorError;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use bytes::Bytes;
use hollow_types::{GitTaskRequest, PublishRequest, TaskInfo, TaskKind};
use serde::de::DeserializeOwned;

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Busy(_) | OrchestratorError::Finished(_) => {
                ApiError::Conflict(e.to_string())
            }
            OrchestratorError::NotFound(_) => ApiError::NotFound(e.to_string()),
        }
    }
}

/// Task bodies are optional: an empty body starts the task with defaults
fn task_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {}", e)))
}

pub async fn publish(
    _auth: Authenticated,
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<String>> {
    let req: PublishRequest = task_body(&body)?;
    let task = state
        .orchestrator
        .start(TaskKind::Publish, req.project_id, None)?;
    Ok(Json(task.key))
}

pub async fn pull(
    _auth: Authenticated,
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<String>> {
    let req: GitTaskRequest = task_body(&body)?;
    let task = state
        .orchestrator
        .start(TaskKind::Pull, req.project_id, req.repo)?;
    Ok(Json(task.key))
}

pub async fn push(
    _auth: Authenticated,
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<String>> {
    let req: GitTaskRequest = task_body(&body)?;
    let task = state
        .orchestrator
        .start(TaskKind::Push, req.project_id, req.repo)?;
    Ok(Json(task.key))
}

pub async fn status(
    _auth: Authenticated,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<TaskInfo>> {
    state
        .orchestrator
        .status(&key)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown task {}", key)))
}

pub async fn cancel(
    _auth: Authenticated,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<&'static str>> {
    state.orchestrator.cancel(&key)?;
    Ok(Json("ok"))
}
