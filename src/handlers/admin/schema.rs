use axum::{body::Bytes, extract::{Path, State}};

use crate::middleware::{ApiResponse, ApiResult};
use crate::schema::CollectionSchema;
use crate::state::AppState;

/// GET /api/v1/projects/:id/collections/:name/schema
pub async fn schema_get(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<CollectionSchema> {
    Ok(ApiResponse::success(state.project_service().get_schema(&id, &name)?))
}

/// PUT /api/v1/projects/:id/collections/:name/schema - full replace
pub async fn schema_put(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<CollectionSchema> {
    let schema = state.project_service().put_schema(&id, &name, &body).await?;
    Ok(ApiResponse::success(schema))
}
