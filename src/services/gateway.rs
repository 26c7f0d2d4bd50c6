//! Data-plane request handling.
//!
//! Each request walks the same states: authenticate the API key, check the
//! path project matches the key, check the collection is active, acquire the
//! project's handle, confirm the collection still exists, validate the payload
//! for writes, then execute. Every check runs before the operation, so a
//! request that fails one never writes anything.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::format;
use crate::config::SecurityConfig;
use crate::credentials::verify_secret;
use crate::error::ApiError;
use crate::middleware::ApiCredentials;
use crate::pool::{ConnectionPool, Lease};
use crate::registry::{Project, ProjectRegistry};
use crate::schema::{self, SchemaRegistry};
use crate::store::Document;
use crate::types::Operation;

/// Addressing for one data-plane request
#[derive(Debug, Clone)]
pub struct DataRequest {
    pub project_id: String,
    pub collection: String,
    pub document_id: Option<String>,
    pub operation: Operation,
}

impl DataRequest {
    pub fn collection(operation: Operation, project_id: String, collection: String) -> Self {
        Self {
            project_id,
            collection,
            document_id: None,
            operation,
        }
    }

    pub fn document(operation: Operation, project_id: String, collection: String, id: String) -> Self {
        Self {
            project_id,
            collection,
            document_id: Some(id),
            operation,
        }
    }
}

#[derive(Debug)]
pub enum DataOutcome {
    Listed(Vec<Document>),
    Found(Document),
    Created(Document),
    Replaced(Document),
    Deleted(String),
}

pub struct DataGateway {
    projects: Arc<ProjectRegistry>,
    schemas: Arc<SchemaRegistry>,
    pool: Arc<ConnectionPool>,
    security: SecurityConfig,
}

impl DataGateway {
    pub fn new(state: &crate::state::AppState) -> Self {
        Self {
            projects: state.projects.clone(),
            schemas: state.schemas.clone(),
            pool: state.pool.clone(),
            security: state.security.clone(),
        }
    }

    pub async fn execute(
        &self,
        credentials: &ApiCredentials,
        request: DataRequest,
        body: &[u8],
    ) -> Result<DataOutcome, ApiError> {
        if request.operation.targets_document() != request.document_id.is_some() {
            return Err(ApiError::bad_request(format!(
                "Malformed {} request",
                request.operation.as_str()
            )));
        }
        let project = self.authenticate(credentials, &request.project_id)?;

        if !project.is_active(&request.collection) {
            debug!(
                "Collection {} is not active on project {}",
                request.collection, project.id
            );
            return Err(collection_not_found());
        }

        let lease = self.pool.acquire(&project.id).await?;
        if !lease.collection_exists(&request.collection).await? {
            return Err(collection_not_found());
        }

        let payload = if request.operation.validates_payload() {
            Some(self.prepare_payload(&project, &request.collection, body)?)
        } else {
            None
        };

        run(&lease, request, payload).await
    }

    /// Resolve the key to its project and require it to own the path project
    fn authenticate(&self, credentials: &ApiCredentials, project_id: &str) -> Result<Arc<Project>, ApiError> {
        let Some(project) = self.projects.find_by_api_key(&credentials.api_key) else {
            warn!("Rejected data request for project {}: unknown API key", project_id);
            return Err(ApiError::unauthorized("Invalid API key"));
        };

        if project.id != project_id {
            warn!(
                "Rejected data request for project {}: key belongs to project {}",
                project_id, project.id
            );
            return Err(ApiError::unauthorized("Invalid API key"));
        }

        match credentials.api_secret.as_deref() {
            Some(secret) if !verify_secret(secret, &project.api_secret_hash) => {
                warn!("Rejected data request for project {}: bad API secret", project.id);
                Err(ApiError::unauthorized("Invalid API secret"))
            }
            None if self.security.require_api_secret => {
                warn!("Rejected data request for project {}: missing API secret", project.id);
                Err(ApiError::unauthorized("X-API-Secret header is required"))
            }
            _ => Ok(project),
        }
    }

    fn prepare_payload(&self, project: &Project, collection: &str, body: &[u8]) -> Result<Document, ApiError> {
        let mut document = format::parse_object(body)?;
        format::strip_identifier(&mut document);

        if let Some(schema) = self.schemas.get(&project.id, collection) {
            schema::validate(&schema, &document)?;
        }
        Ok(document)
    }
}

async fn run(lease: &Lease, request: DataRequest, payload: Option<Document>) -> Result<DataOutcome, ApiError> {
    let collection = request.collection.as_str();
    let id = request.document_id.as_deref();

    match (request.operation, id, payload) {
        (Operation::List, _, _) => Ok(DataOutcome::Listed(lease.find_all(collection).await?)),
        (Operation::Create, _, Some(document)) => Ok(DataOutcome::Created(lease.insert(collection, document).await?)),
        (Operation::Read, Some(id), _) => lease
            .find_one(collection, id)
            .await?
            .map(DataOutcome::Found)
            .ok_or_else(document_not_found),
        (Operation::Replace, Some(id), Some(document)) => lease
            .replace(collection, id, document)
            .await?
            .map(DataOutcome::Replaced)
            .ok_or_else(document_not_found),
        (Operation::Delete, Some(id), _) => {
            if lease.delete(collection, id).await? {
                Ok(DataOutcome::Deleted(id.to_string()))
            } else {
                Err(document_not_found())
            }
        }
        (operation, _, _) => Err(ApiError::bad_request(format!(
            "Malformed {} request",
            operation.as_str()
        ))),
    }
}

fn collection_not_found() -> ApiError {
    ApiError::not_found("Collection not found")
}

fn document_not_found() -> ApiError {
    ApiError::not_found("Document not found")
}
