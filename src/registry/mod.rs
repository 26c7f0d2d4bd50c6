//! Project registry: the authoritative in-memory index of registered
//! projects, written through to the metadata store when one is configured.
//!
//! Records are immutable `Arc<Project>` snapshots. An update builds a new
//! snapshot and swaps it in under the write lock, so readers observe either
//! the whole previous record or the whole new one.

pub mod project;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::database::{DatabaseError, MetadataStore};

pub use project::{Project, ProjectInput, ProjectPatch, RotatedCredentials};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Project not found: {0}")]
    NotFound(String),

    #[error("API key already assigned to another project")]
    DuplicateApiKey,

    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

#[derive(Default)]
struct Index {
    by_id: HashMap<String, Arc<Project>>,
    by_key: HashMap<String, String>,
}

impl Index {
    fn insert(&mut self, project: Arc<Project>) {
        self.by_key.insert(project.api_key.clone(), project.id.clone());
        self.by_id.insert(project.id.clone(), project);
    }

    fn remove(&mut self, id: &str) -> Option<Arc<Project>> {
        let project = self.by_id.remove(id)?;
        self.by_key.remove(&project.api_key);
        Some(project)
    }

    fn key_taken_by_other(&self, api_key: &str, id: &str) -> bool {
        self.by_key.get(api_key).is_some_and(|owner| owner != id)
    }
}

pub struct ProjectRegistry {
    index: RwLock<Index>,
    // Serializes writers so read-modify-write patches never interleave
    writer: tokio::sync::Mutex<()>,
    persistence: Option<Arc<dyn MetadataStore>>,
}

impl ProjectRegistry {
    pub fn new(persistence: Option<Arc<dyn MetadataStore>>) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            writer: tokio::sync::Mutex::new(()),
            persistence,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Populate the index from the metadata store
    pub async fn load(&self) -> Result<usize, RegistryError> {
        let Some(store) = &self.persistence else {
            return Ok(0);
        };

        let projects = store.load_projects().await?;
        let count = projects.len();

        let _writer = self.writer.lock().await;
        let mut index = self.write_index();
        for project in projects {
            index.insert(Arc::new(project));
        }
        info!("Loaded {} projects from metadata store", count);
        Ok(count)
    }

    /// Register a new project. Reachability of the database is not checked here.
    pub async fn create(
        &self,
        input: ProjectInput,
        api_key: String,
        api_secret_hash: String,
    ) -> Result<Arc<Project>, RegistryError> {
        let fields = input.normalize()?;

        let _writer = self.writer.lock().await;
        if self.read_index().by_key.contains_key(&api_key) {
            return Err(RegistryError::DuplicateApiKey);
        }

        let project = Project {
            id: Uuid::new_v4().simple().to_string(),
            name: fields.name,
            db_host: fields.db_host,
            db_port: fields.db_port,
            db_user: fields.db_user,
            db_password: fields.db_password,
            db_name: fields.db_name,
            auth_source: fields.auth_source,
            api_key,
            api_secret_hash,
            active_collections: Default::default(),
            created_at: Utc::now(),
        };

        if let Some(store) = &self.persistence {
            store.save_project(&project).await?;
        }

        let project = Arc::new(project);
        self.write_index().insert(project.clone());
        Ok(project)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Project>> {
        self.read_index().by_id.get(id).cloned()
    }

    pub fn find_by_api_key(&self, api_key: &str) -> Option<Arc<Project>> {
        let index = self.read_index();
        index
            .by_key
            .get(api_key)
            .and_then(|id| index.by_id.get(id))
            .cloned()
    }

    /// All projects, oldest first
    pub fn list(&self) -> Vec<Arc<Project>> {
        let mut projects: Vec<_> = self.read_index().by_id.values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        projects
    }

    /// Apply a partial patch and swap in the resulting record
    pub async fn update(&self, id: &str, patch: &ProjectPatch) -> Result<Arc<Project>, RegistryError> {
        let _writer = self.writer.lock().await;
        self.update_locked(id, patch).await
    }

    /// Add or remove one collection from the active set. The read and the
    /// write happen under one writer guard, so concurrent patches are not lost.
    pub async fn set_collection_active(
        &self,
        id: &str,
        collection: &str,
        active: bool,
    ) -> Result<Arc<Project>, RegistryError> {
        let _writer = self.writer.lock().await;

        let current = self
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if current.is_active(collection) == active {
            return Ok(current);
        }

        let mut collections = current.active_collections.clone();
        if active {
            collections.insert(collection.to_string());
        } else {
            collections.remove(collection);
        }
        let patch = ProjectPatch {
            active_collections: Some(collections.into_iter().collect()),
            ..Default::default()
        };
        self.update_locked(id, &patch).await
    }

    // Caller holds `writer`
    async fn update_locked(&self, id: &str, patch: &ProjectPatch) -> Result<Arc<Project>, RegistryError> {
        let current = self
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let updated = patch.apply(&current)?;

        if self.read_index().key_taken_by_other(&updated.api_key, id) {
            return Err(RegistryError::DuplicateApiKey);
        }

        if let Some(store) = &self.persistence {
            store.save_project(&updated).await?;
        }

        let updated = Arc::new(updated);
        let mut index = self.write_index();
        index.remove(id);
        index.insert(updated.clone());
        Ok(updated)
    }

    /// Remove a project. The entry is gone from the index when this returns.
    pub async fn delete(&self, id: &str) -> Result<Arc<Project>, RegistryError> {
        let _writer = self.writer.lock().await;

        if self.get(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        if let Some(store) = &self.persistence {
            store.delete_project(id).await?;
        }

        self.write_index()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.read_index().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_index(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(host: &str, db: &str) -> ProjectInput {
        ProjectInput {
            db_host: Some(host.to_string()),
            db_name: Some(db.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_defaults() {
        let registry = ProjectRegistry::in_memory();
        let project = registry
            .create(input("db.local", "shop"), "key-1".into(), "hash".into())
            .await
            .unwrap();

        assert_eq!(project.id.len(), 32);
        assert_eq!(project.name, "shop");
        assert_eq!(project.db_port, "27017");
        assert_eq!(project.auth_source, "admin");
        assert!(project.active_collections.is_empty());
        assert_eq!(registry.get(&project.id).unwrap().api_key, "key-1");
        assert_eq!(registry.find_by_api_key("key-1").unwrap().id, project.id);
    }

    #[tokio::test]
    async fn create_requires_host_and_database() {
        let registry = ProjectRegistry::in_memory();
        let err = registry
            .create(input("", "shop"), "k".into(), "h".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));

        let err = registry
            .create(input("db.local", "  "), "k".into(), "h".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidInput(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn rejects_duplicate_api_keys() {
        let registry = ProjectRegistry::in_memory();
        registry.create(input("a", "x"), "same".into(), "h".into()).await.unwrap();
        let err = registry
            .create(input("b", "y"), "same".into(), "h".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateApiKey));
    }

    #[tokio::test]
    async fn update_swaps_whole_record_and_reindexes_keys() {
        let registry = ProjectRegistry::in_memory();
        let project = registry.create(input("a", "x"), "old".into(), "h1".into()).await.unwrap();

        let patch = ProjectPatch {
            active_collections: Some(vec!["posts".into(), "posts".into(), "users".into()]),
            credentials: Some(RotatedCredentials {
                api_key: "new".into(),
                api_secret_hash: "h2".into(),
            }),
            ..Default::default()
        };
        let updated = registry.update(&project.id, &patch).await.unwrap();

        assert_eq!(updated.active_collections.len(), 2);
        assert!(registry.find_by_api_key("old").is_none());
        assert_eq!(registry.find_by_api_key("new").unwrap().id, project.id);
        // the old snapshot is untouched
        assert!(project.active_collections.is_empty());
    }

    #[tokio::test]
    async fn toggle_active_collection_and_delete() {
        let registry = ProjectRegistry::in_memory();
        let project = registry.create(input("a", "x"), "k".into(), "h".into()).await.unwrap();
        let patch = ProjectPatch {
            active_collections: Some(vec!["posts".into(), "users".into()]),
            ..Default::default()
        };
        registry.update(&project.id, &patch).await.unwrap();

        let updated = registry.set_collection_active(&project.id, "posts", false).await.unwrap();
        assert!(!updated.active_collections.contains("posts"));
        assert!(updated.active_collections.contains("users"));

        let updated = registry.set_collection_active(&project.id, "posts", true).await.unwrap();
        assert!(updated.is_active("posts"));
        assert!(updated.is_active("users"));

        registry.delete(&project.id).await.unwrap();
        assert!(registry.get(&project.id).is_none());
        assert!(registry.find_by_api_key("k").is_none());
        assert!(matches!(
            registry.delete(&project.id).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_toggles_are_not_lost() {
        let registry = Arc::new(ProjectRegistry::in_memory());
        let project = registry.create(input("a", "x"), "k".into(), "h".into()).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let registry = registry.clone();
                let id = project.id.clone();
                tokio::spawn(async move {
                    registry
                        .set_collection_active(&id, &format!("c{}", i), true)
                        .await
                        .map(|_| ())
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registry.get(&project.id).unwrap().active_collections.len(), 20);
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let registry = ProjectRegistry::in_memory();
        let first = registry.create(input("a", "one"), "k1".into(), "h".into()).await.unwrap();
        let second = registry.create(input("a", "two"), "k2".into(), "h".into()).await.unwrap();

        let ids: Vec<_> = registry.list().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
        assert!(registry.list()[0].created_at <= registry.list()[1].created_at);
    }
}
