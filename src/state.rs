use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};
use crate::credentials::CredentialIssuer;
use crate::database::{DatabaseManager, MetadataStore};
use crate::pool::{ConnectionPool, PoolSettings};
use crate::registry::ProjectRegistry;
use crate::schema::SchemaRegistry;
use crate::services::{DataGateway, ProjectService};
use crate::store::Connector;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<ProjectRegistry>,
    pub schemas: Arc<SchemaRegistry>,
    pub pool: Arc<ConnectionPool>,
    pub issuer: CredentialIssuer,
    pub security: SecurityConfig,
    pub metadata: Option<DatabaseManager>,
}

impl AppState {
    /// State whose projects and schemas live only in memory
    pub fn in_memory(connector: Arc<dyn Connector>, config: &AppConfig) -> Self {
        Self::assemble(connector, config, None, None)
    }

    /// State that writes through to the metadata database and reloads it
    pub async fn persistent(
        connector: Arc<dyn Connector>,
        config: &AppConfig,
        manager: DatabaseManager,
        store: Arc<dyn MetadataStore>,
    ) -> anyhow::Result<Self> {
        let state = Self::assemble(connector, config, Some(manager), Some(store));
        state.projects.load().await?;
        state.schemas.load().await?;
        Ok(state)
    }

    fn assemble(
        connector: Arc<dyn Connector>,
        config: &AppConfig,
        manager: Option<DatabaseManager>,
        store: Option<Arc<dyn MetadataStore>>,
    ) -> Self {
        let projects = Arc::new(ProjectRegistry::new(store.clone()));
        let schemas = Arc::new(SchemaRegistry::new(store));
        let pool = Arc::new(ConnectionPool::new(
            connector,
            projects.clone(),
            PoolSettings::from(&config.pool),
        ));

        Self {
            projects,
            schemas,
            pool,
            issuer: CredentialIssuer::default(),
            security: config.security.clone(),
            metadata: manager,
        }
    }

    /// Swap the credential issuer, e.g. for a failing entropy source in tests
    pub fn with_issuer(mut self, issuer: CredentialIssuer) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn project_service(&self) -> ProjectService {
        ProjectService::new(self)
    }

    pub fn gateway(&self) -> DataGateway {
        DataGateway::new(self)
    }
}
