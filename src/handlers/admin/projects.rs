use std::sync::Arc;

use axum::{body::Bytes, extract::{Path, State}};
use serde_json::Value;

use crate::middleware::{ApiResponse, ApiResult};
use crate::registry::Project;
use crate::services::ProjectWithSecret;
use crate::state::AppState;

/// POST /api/v1/projects - register a project; the secret is returned only here
pub async fn project_create(State(state): State<AppState>, body: Bytes) -> ApiResult<ProjectWithSecret> {
    let created = state.project_service().create(&body).await?;
    Ok(ApiResponse::created(created))
}

/// GET /api/v1/projects
pub async fn project_list(State(state): State<AppState>) -> ApiResult<Vec<Arc<Project>>> {
    Ok(ApiResponse::success(state.project_service().list()))
}

/// GET /api/v1/projects/:id
pub async fn project_get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Arc<Project>> {
    Ok(ApiResponse::success(state.project_service().get(&id)?))
}

/// PUT /api/v1/projects/:id - partial update, optional credential rotation
pub async fn project_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<ProjectWithSecret> {
    let updated = state.project_service().update(&id, &body).await?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /api/v1/projects/:id
pub async fn project_delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    Ok(ApiResponse::success(state.project_service().delete(&id).await?))
}
