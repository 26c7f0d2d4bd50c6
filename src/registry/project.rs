use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RegistryError;
use crate::store::ConnectionParams;

const DEFAULT_PORT: &str = "27017";
const DEFAULT_AUTH_SOURCE: &str = "admin";

/// A registered external database and its data-plane credentials.
///
/// `db_password` and `api_secret_hash` never leave the process in a response.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub db_host: String,
    pub db_port: String,
    pub db_user: String,
    #[serde(skip_serializing)]
    pub db_password: String,
    pub db_name: String,
    pub auth_source: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret_hash: String,
    pub active_collections: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("active_collections", &self.active_collections)
            .finish_non_exhaustive()
    }
}

impl Project {
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.db_host.clone(),
            port: self.db_port.clone(),
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            db_name: self.db_name.clone(),
            auth_source: self.auth_source.clone(),
        }
    }

    pub fn is_active(&self, collection: &str) -> bool {
        self.active_collections.contains(collection)
    }
}

/// Port as sent by clients: `"27017"` or `27017`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Text(String),
    Number(u64),
}

impl PortValue {
    fn into_text(self) -> String {
        match self {
            PortValue::Text(s) => s.trim().to_string(),
            PortValue::Number(n) => n.to_string(),
        }
    }
}

/// POST /api/v1/projects body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInput {
    pub name: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<PortValue>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    pub auth_source: Option<String>,
}

pub(super) struct NormalizedInput {
    pub name: String,
    pub db_host: String,
    pub db_port: String,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub auth_source: String,
}

impl ProjectInput {
    pub(super) fn normalize(self) -> Result<NormalizedInput, RegistryError> {
        let db_host = required_text(self.db_host, "dbHost")?;
        let db_name = required_text(self.db_name, "dbName")?;
        let db_port = normalize_port(self.db_port)?;
        let name = optional_text(self.name).unwrap_or_else(|| db_name.clone());
        let auth_source = optional_text(self.auth_source).unwrap_or_else(|| DEFAULT_AUTH_SOURCE.to_string());

        Ok(NormalizedInput {
            name,
            db_host,
            db_port,
            db_user: self.db_user.map(|u| u.trim().to_string()).unwrap_or_default(),
            db_password: self.db_password.unwrap_or_default(),
            db_name,
            auth_source,
        })
    }
}

/// Replacement credentials produced by rotation; never deserialized from a body
#[derive(Clone)]
pub struct RotatedCredentials {
    pub api_key: String,
    pub api_secret_hash: String,
}

/// PUT /api/v1/projects/:id body. Absent fields keep their current value.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<PortValue>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    pub auth_source: Option<String>,
    pub active_collections: Option<Vec<String>>,
    #[serde(default)]
    pub rotate_credentials: bool,
    #[serde(skip)]
    pub credentials: Option<RotatedCredentials>,
}

impl ProjectPatch {
    /// Whether applying this patch changes how the project's database is reached
    pub fn touches_connection(&self) -> bool {
        self.db_host.is_some()
            || self.db_port.is_some()
            || self.db_user.is_some()
            || self.db_password.is_some()
            || self.db_name.is_some()
            || self.auth_source.is_some()
    }

    pub(super) fn apply(&self, current: &Project) -> Result<Project, RegistryError> {
        let mut next = current.clone();

        if let Some(name) = optional_text(self.name.clone()) {
            next.name = name;
        }
        if let Some(host) = &self.db_host {
            next.db_host = required_text(Some(host.clone()), "dbHost")?;
        }
        if let Some(port) = &self.db_port {
            next.db_port = normalize_port(Some(port.clone()))?;
        }
        if let Some(user) = &self.db_user {
            next.db_user = user.trim().to_string();
        }
        if let Some(password) = &self.db_password {
            next.db_password = password.clone();
        }
        if let Some(db_name) = &self.db_name {
            next.db_name = required_text(Some(db_name.clone()), "dbName")?;
        }
        if let Some(auth_source) = &self.auth_source {
            next.auth_source = optional_text(Some(auth_source.clone()))
                .unwrap_or_else(|| DEFAULT_AUTH_SOURCE.to_string());
        }
        if let Some(collections) = &self.active_collections {
            let mut set = BTreeSet::new();
            for name in collections {
                let name = name.trim();
                if name.is_empty() {
                    return Err(RegistryError::InvalidInput(
                        "activeCollections cannot contain empty names".to_string(),
                    ));
                }
                set.insert(name.to_string());
            }
            next.active_collections = set;
        }
        if let Some(credentials) = &self.credentials {
            next.api_key = credentials.api_key.clone();
            next.api_secret_hash = credentials.api_secret_hash.clone();
        }

        Ok(next)
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required_text(value: Option<String>, field: &str) -> Result<String, RegistryError> {
    optional_text(value).ok_or_else(|| RegistryError::InvalidInput(format!("{} is required", field)))
}

fn normalize_port(value: Option<PortValue>) -> Result<String, RegistryError> {
    let text = value
        .map(PortValue::into_text)
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());

    match text.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port.to_string()),
        _ => Err(RegistryError::InvalidInput(format!("dbPort '{}' is not a valid port", text))),
    }
}
