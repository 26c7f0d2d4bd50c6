use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use super::manager::{DatabaseError, DatabaseManager};
use super::models::{ProjectRow, SchemaRow};
use super::MetadataStore;
use crate::registry::Project;
use crate::schema::CollectionSchema;

const CREATE_PROJECTS: &str = r#"
    CREATE TABLE IF NOT EXISTS gateway_projects (
        id                 TEXT PRIMARY KEY,
        name               TEXT NOT NULL,
        db_host            TEXT NOT NULL,
        db_port            TEXT NOT NULL,
        db_user            TEXT NOT NULL DEFAULT '',
        db_password        TEXT NOT NULL DEFAULT '',
        db_name            TEXT NOT NULL,
        auth_source        TEXT NOT NULL,
        api_key            TEXT NOT NULL UNIQUE,
        api_secret_hash    TEXT NOT NULL,
        active_collections TEXT[] NOT NULL DEFAULT '{}',
        created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

const CREATE_SCHEMAS: &str = r#"
    CREATE TABLE IF NOT EXISTS gateway_schemas (
        project_id      TEXT NOT NULL REFERENCES gateway_projects(id) ON DELETE CASCADE,
        collection_name TEXT NOT NULL,
        properties      JSONB NOT NULL DEFAULT '{}',
        required        TEXT[] NOT NULL DEFAULT '{}',
        PRIMARY KEY (project_id, collection_name)
    )
"#;

/// Postgres-backed metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(manager: &DatabaseManager) -> Self {
        Self {
            pool: manager.pool().clone(),
        }
    }

    /// Create the metadata tables if they do not exist yet
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::query(CREATE_PROJECTS).execute(&self.pool).await?;
        sqlx::query(CREATE_SCHEMAS).execute(&self.pool).await?;
        debug!("Metadata tables ready");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn load_projects(&self) -> Result<Vec<Project>, DatabaseError> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT id, name, db_host, db_port, db_user, db_password, db_name, auth_source, \
             api_key, api_secret_hash, active_collections, created_at \
             FROM gateway_projects ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn save_project(&self, project: &Project) -> Result<(), DatabaseError> {
        let active: Vec<String> = project.active_collections.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO gateway_projects
                (id, name, db_host, db_port, db_user, db_password, db_name, auth_source,
                 api_key, api_secret_hash, active_collections, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                db_host = EXCLUDED.db_host,
                db_port = EXCLUDED.db_port,
                db_user = EXCLUDED.db_user,
                db_password = EXCLUDED.db_password,
                db_name = EXCLUDED.db_name,
                auth_source = EXCLUDED.auth_source,
                api_key = EXCLUDED.api_key,
                api_secret_hash = EXCLUDED.api_secret_hash,
                active_collections = EXCLUDED.active_collections
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.db_host)
        .bind(&project.db_port)
        .bind(&project.db_user)
        .bind(&project.db_password)
        .bind(&project.db_name)
        .bind(&project.auth_source)
        .bind(&project.api_key)
        .bind(&project.api_secret_hash)
        .bind(&active)
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM gateway_projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_schemas(&self) -> Result<Vec<CollectionSchema>, DatabaseError> {
        let rows: Vec<SchemaRow> = sqlx::query_as(
            "SELECT project_id, collection_name, properties, required FROM gateway_schemas",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CollectionSchema::try_from).collect()
    }

    async fn save_schema(&self, schema: &CollectionSchema) -> Result<(), DatabaseError> {
        let properties = serde_json::to_value(&schema.properties)
            .map_err(|e| DatabaseError::CorruptRow(e.to_string()))?;
        let required: Vec<String> = schema.required.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO gateway_schemas (project_id, collection_name, properties, required)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (project_id, collection_name) DO UPDATE SET
                properties = EXCLUDED.properties,
                required = EXCLUDED.required
            "#,
        )
        .bind(&schema.project_id)
        .bind(&schema.collection_name)
        .bind(Json(properties))
        .bind(&required)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_schema(&self, project_id: &str, collection: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM gateway_schemas WHERE project_id = $1 AND collection_name = $2")
            .bind(project_id)
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_project_schemas(&self, project_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM gateway_schemas WHERE project_id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
