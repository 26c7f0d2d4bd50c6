use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::api::format;
use crate::credentials::{CredentialIssuer, IssuedCredentials};
use crate::error::ApiError;
use crate::pool::ConnectionPool;
use crate::registry::{Project, ProjectInput, ProjectPatch, ProjectRegistry, RotatedCredentials};
use crate::schema::{CollectionSchema, SchemaRegistry};
use crate::state::AppState;

/// MongoDB limits full namespaces to 120 bytes
const MAX_COLLECTION_NAME_BYTES: usize = 120;

/// A project record with the plaintext secret attached. Only built right
/// after the secret was issued.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithSecret {
    #[serde(flatten)]
    pub project: Arc<Project>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedKey {
    pub api_key: String,
    pub api_secret: String,
    pub message: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest {
    collection_name: Option<String>,
    #[serde(default)]
    schema: Option<Value>,
}

/// Admin-plane operations over projects, collections and schemas
pub struct ProjectService {
    projects: Arc<ProjectRegistry>,
    schemas: Arc<SchemaRegistry>,
    pool: Arc<ConnectionPool>,
    issuer: CredentialIssuer,
}

impl ProjectService {
    pub fn new(state: &AppState) -> Self {
        Self {
            projects: state.projects.clone(),
            schemas: state.schemas.clone(),
            pool: state.pool.clone(),
            issuer: state.issuer.clone(),
        }
    }

    /// Issue a key/secret pair that is not bound to any project
    pub fn generate_key(&self) -> Result<GeneratedKey, ApiError> {
        let IssuedCredentials { api_key, api_secret } = self.issuer.generate()?;
        Ok(GeneratedKey {
            api_key,
            api_secret,
            message: "Store the secret now; it cannot be retrieved again",
        })
    }

    pub async fn create(&self, body: &[u8]) -> Result<ProjectWithSecret, ApiError> {
        let input: ProjectInput = format::parse_json(body)?;
        let issued = self.issuer.generate()?;
        let secret_hash = self.issuer.hash_secret(&issued.api_secret)?;

        let project = self.projects.create(input, issued.api_key, secret_hash).await?;
        info!("Registered project {} ({})", project.id, project.name);

        Ok(ProjectWithSecret {
            project,
            api_secret: Some(issued.api_secret),
        })
    }

    pub fn list(&self) -> Vec<Arc<Project>> {
        self.projects.list()
    }

    pub fn get(&self, id: &str) -> Result<Arc<Project>, ApiError> {
        self.projects
            .get(id)
            .ok_or_else(|| ApiError::not_found("Project not found"))
    }

    /// Partial update. `rotateCredentials: true` replaces the key and secret.
    pub async fn update(&self, id: &str, body: &[u8]) -> Result<ProjectWithSecret, ApiError> {
        let mut patch: ProjectPatch = format::parse_json(body)?;
        self.get(id)?;

        let mut api_secret = None;
        if patch.rotate_credentials {
            let issued = self.issuer.generate()?;
            patch.credentials = Some(RotatedCredentials {
                api_key: issued.api_key,
                api_secret_hash: self.issuer.hash_secret(&issued.api_secret)?,
            });
            api_secret = Some(issued.api_secret);
        }

        let project = self.projects.update(id, &patch).await?;
        if api_secret.is_some() {
            info!("Rotated credentials for project {}", id);
        }
        if patch.touches_connection() && self.pool.evict(id).await {
            info!("Connection parameters changed for project {}; handle closed", id);
        }

        Ok(ProjectWithSecret { project, api_secret })
    }

    /// Forget a project. Documents in its database are left alone.
    pub async fn delete(&self, id: &str) -> Result<Value, ApiError> {
        let project = self.projects.delete(id).await?;
        self.pool.evict(id).await;
        self.schemas.clear_project(id).await?;

        info!("Deleted project {} ({})", project.id, project.name);
        Ok(format::message(format!("Project '{}' deleted", project.name)))
    }

    pub async fn list_collections(&self, id: &str) -> Result<Vec<String>, ApiError> {
        self.get(id)?;
        let lease = self.pool.acquire(id).await?;
        Ok(lease.list_collections().await?)
    }

    pub async fn create_collection(&self, id: &str, body: &[u8]) -> Result<Value, ApiError> {
        let request: CreateCollectionRequest = format::parse_json(body)?;
        let name = request.collection_name.unwrap_or_default().trim().to_string();
        validate_collection_name(&name)?;
        self.get(id)?;

        // Reject bad schemas before touching the database
        let schema = CollectionSchema::from_definition(id, &name, request.schema.as_ref())?;

        let lease = self.pool.acquire(id).await?;

        // The schema is stored first so a failed write leaves no bare collection
        let previous = self.schemas.get(id, &name);
        let has_schema = !schema.is_empty();
        if has_schema {
            self.schemas.set(schema).await?;
        }
        if let Err(e) = lease.create_collection(&name).await {
            if has_schema {
                self.restore_schema(id, &name, previous).await;
            }
            return Err(e.into());
        }

        info!("Created collection {} in project {}", name, id);
        Ok(format::message(format!("Collection '{}' created", name)))
    }

    /// Drop a collection with all its documents, its schema and its activation.
    /// Metadata goes first; if a later step fails the earlier ones are undone.
    pub async fn drop_collection(&self, id: &str, name: &str) -> Result<Value, ApiError> {
        let project = self.get(id)?;
        let lease = self.pool.acquire(id).await?;
        if !lease.collection_exists(name).await? {
            return Err(ApiError::not_found("Collection not found"));
        }

        let previous = self.schemas.get(id, name);
        let was_active = project.is_active(name);

        self.schemas.clear(id, name).await?;
        if let Err(e) = self.projects.set_collection_active(id, name, false).await {
            self.restore_schema(id, name, previous).await;
            return Err(e.into());
        }
        if let Err(e) = lease.drop_collection(name).await {
            self.restore_schema(id, name, previous).await;
            if was_active {
                if let Err(undo) = self.projects.set_collection_active(id, name, true).await {
                    warn!("Could not reactivate {}/{} after a failed drop: {}", id, name, undo);
                }
            }
            return Err(e.into());
        }

        info!("Dropped collection {} in project {}", name, id);
        Ok(format::message(format!("Collection '{}' deleted", name)))
    }

    async fn restore_schema(&self, id: &str, name: &str, previous: Option<Arc<CollectionSchema>>) {
        let restored = match previous {
            Some(schema) => self.schemas.set(schema.as_ref().clone()).await,
            None => self.schemas.clear(id, name).await,
        };
        if let Err(e) = restored {
            warn!("Could not restore schema for {}/{}: {}", id, name, e);
        }
    }

    /// The collection's schema; an empty schema when none is set
    pub fn get_schema(&self, id: &str, name: &str) -> Result<CollectionSchema, ApiError> {
        self.get(id)?;
        Ok(self
            .schemas
            .get(id, name)
            .map(|schema| schema.as_ref().clone())
            .unwrap_or_else(|| CollectionSchema::empty(id, name)))
    }

    /// Replace the collection's schema wholesale; `{}` removes it
    pub async fn put_schema(&self, id: &str, name: &str, body: &[u8]) -> Result<CollectionSchema, ApiError> {
        validate_collection_name(name)?;
        self.get(id)?;

        let definition = format::parse_optional(body)?;
        let schema = CollectionSchema::from_definition(id, name, definition.as_ref())?;
        self.schemas.set(schema.clone()).await?;

        if schema.is_empty() {
            info!("Cleared schema for {}/{}", id, name);
        } else {
            info!("Replaced schema for {}/{}", id, name);
        }
        Ok(schema)
    }
}

pub fn validate_collection_name(name: &str) -> Result<(), ApiError> {
    let problem = if name.is_empty() {
        Some("collectionName is required")
    } else if name.contains('$') || name.contains('\0') {
        Some("collectionName cannot contain '$' or NUL characters")
    } else if name.starts_with("system.") {
        Some("collectionName cannot start with 'system.'")
    } else if name.len() > MAX_COLLECTION_NAME_BYTES {
        Some("collectionName is too long")
    } else {
        None
    };

    match problem {
        Some(reason) => {
            warn!("Rejected collection name {:?}: {}", name, reason);
            Err(ApiError::bad_request(reason))
        }
        None => Ok(()),
    }
}
