use axum::{body::Bytes, extract::{Path, State}};
use serde_json::Value;

use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET /api/v1/projects/:id/collections - names in the project's database
pub async fn collection_list(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<String>> {
    let names = state.project_service().list_collections(&id).await?;
    Ok(ApiResponse::success(names))
}

/// POST /api/v1/projects/:id/collections - `{collectionName, schema}`
pub async fn collection_create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Value> {
    let message = state.project_service().create_collection(&id, &body).await?;
    Ok(ApiResponse::created(message))
}

/// DELETE /api/v1/projects/:id/collections/:name
pub async fn collection_delete(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<Value> {
    let message = state.project_service().drop_collection(&id, &name).await?;
    Ok(ApiResponse::success(message))
}
