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

/// GET /api/v1/data/:projectId/:collection - every document in the collection
pub async fn collection_get(
    State(state): State<AppState>,
    Extension(credentials): Extension<ApiCredentials>,
    Path((project_id, collection)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let request = DataRequest::collection(Operation::List, project_id, collection);
    let outcome = state.gateway().execute(&credentials, request, &[]).await?;
    Ok(respond(outcome))
}

/// POST /api/v1/data/:projectId/:collection - insert one document
pub async fn collection_post(
    State(state): State<AppState>,
    Extension(credentials): Extension<ApiCredentials>,
    Path((project_id, collection)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = DataRequest::collection(Operation::Create, project_id, collection);
    let outcome = state.gateway().execute(&credentials, request, &body).await?;
    Ok(respond(outcome))
}
