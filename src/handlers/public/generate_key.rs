use axum::extract::State;

use crate::middleware::{ApiResponse, ApiResult};
use crate::services::GeneratedKey;
use crate::state::AppState;

/// POST /api/v1/generate-key - issue a key/secret pair not bound to a project
pub async fn generate_key(State(state): State<AppState>) -> ApiResult<GeneratedKey> {
    let generated = state.project_service().generate_key()?;
    Ok(ApiResponse::success(generated))
}
