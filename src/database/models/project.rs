use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::registry::Project;

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub db_host: String,
    pub db_port: String,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub auth_source: String,
    pub api_key: String,
    pub api_secret_hash: String,
    pub active_collections: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            db_host: row.db_host,
            db_port: row.db_port,
            db_user: row.db_user,
            db_password: row.db_password,
            db_name: row.db_name,
            auth_source: row.auth_source,
            api_key: row.api_key,
            api_secret_hash: row.api_secret_hash,
            active_collections: row.active_collections.into_iter().collect(),
            created_at: row.created_at,
        }
    }
}
