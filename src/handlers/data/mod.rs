// handlers/data/mod.rs - document CRUD, gated by X-API-Key
//
// Handlers only translate paths into a DataRequest; the gateway service owns
// authentication, activation checks, validation and execution.
pub mod collection;
pub mod document;

use axum::response::{IntoResponse, Response};

use crate::api::format;
use crate::middleware::ApiResponse;
use crate::services::DataOutcome;

pub use collection::{collection_get, collection_post};
pub use document::{document_delete, document_get, document_put};

fn respond(outcome: DataOutcome) -> Response {
    match outcome {
        DataOutcome::Listed(documents) => ApiResponse::success(documents).into_response(),
        DataOutcome::Found(document) | DataOutcome::Replaced(document) => {
            ApiResponse::success(document).into_response()
        }
        DataOutcome::Created(document) => ApiResponse::created(document).into_response(),
        DataOutcome::Deleted(id) => {
            ApiResponse::success(format::message(format!("Document '{}' deleted", id))).into_response()
        }
    }
}
