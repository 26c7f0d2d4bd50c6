use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET / - service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "DocBase Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Schema-aware REST CRUD over registered document databases",
        "endpoints": {
            "health": "/health (public)",
            "keys": "/api/v1/generate-key (public)",
            "projects": "/api/v1/projects[/:id] (admin)",
            "collections": "/api/v1/projects/:id/collections[/:name[/schema]] (admin)",
            "data": "/api/v1/data/:projectId/:collection[/:id] (X-API-Key)"
        }
    }))
}

/// GET /health - metadata store status and pool size
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let live_handles = state.pool.live_handles().await;

    let metadata = match &state.metadata {
        None => Ok("memory"),
        Some(manager) => manager.health_check().await.map(|_| "ok"),
    };

    match metadata {
        Ok(status) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "metadata": status,
                "projects": state.projects.len(),
                "liveConnections": live_handles
            })),
        ),
        Err(e) => {
            tracing::error!("Metadata health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "metadata": "unavailable",
                    "error": "metadata database unavailable",
                    "liveConnections": live_handles
                })),
            )
        }
    }
}
