use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    response::Response,
};

use super::respond;
use crate::error::ApiError;
use crate::middleware::ApiCredentials;
use crate::services::DataRequest;
use crate::state::AppState;
use crate::types::Operation;

/// GET /api/v1/data/:projectId/:collection/:id
pub async fn document_get(
    State(state): State<AppState>,
    Extension(credentials): Extension<ApiCredentials>,
    Path((project_id, collection, id)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let request = DataRequest::document(Operation::Read, project_id, collection, id);
    let outcome = state.gateway().execute(&credentials, request, &[]).await?;
    Ok(respond(outcome))
}

/// PUT /api/v1/data/:projectId/:collection/:id - full replace
pub async fn document_put(
    State(state): State<AppState>,
    Extension(credentials): Extension<ApiCredentials>,
    Path((project_id, collection, id)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = DataRequest::document(Operation::Replace, project_id, collection, id);
    let outcome = state.gateway().execute(&credentials, request, &body).await?;
    Ok(respond(outcome))
}

/// DELETE /api/v1/data/:projectId/:collection/:id
pub async fn document_delete(
    State(state): State<AppState>,
    Extension(credentials): Extension<ApiCredentials>,
    Path((project_id, collection, id)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let request = DataRequest::document(Operation::Delete, project_id, collection, id);
    let outcome = state.gateway().execute(&credentials, request, &[]).await?;
    Ok(respond(outcome))
}
