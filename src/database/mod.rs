//! Durable metadata for projects and collection schemas.
//!
//! The gateway keeps its registries in memory and writes through to a
//! [`MetadataStore`] when one is configured. Postgres is the only durable
//! backend; without `DATABASE_URL` nothing survives a restart.

pub mod manager;
pub mod models;
pub mod repository;

use async_trait::async_trait;

use crate::registry::Project;
use crate::schema::CollectionSchema;

pub use manager::{DatabaseError, DatabaseManager};
pub use repository::PgMetadataStore;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn load_projects(&self) -> Result<Vec<Project>, DatabaseError>;

    /// Insert or fully replace a project row
    async fn save_project(&self, project: &Project) -> Result<(), DatabaseError>;

    async fn delete_project(&self, id: &str) -> Result<(), DatabaseError>;

    async fn load_schemas(&self) -> Result<Vec<CollectionSchema>, DatabaseError>;

    async fn save_schema(&self, schema: &CollectionSchema) -> Result<(), DatabaseError>;

    async fn delete_schema(&self, project_id: &str, collection: &str) -> Result<(), DatabaseError>;

    async fn delete_project_schemas(&self, project_id: &str) -> Result<(), DatabaseError>;
}
