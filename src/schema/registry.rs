use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use super::{CollectionSchema, SchemaError};
use crate::database::MetadataStore;

type Key = (String, String);

/// Schemas keyed by (project id, collection name).
///
/// An absent entry and an empty schema both mean "no validation"; setting an
/// empty schema removes the entry.
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<Key, Arc<CollectionSchema>>>,
    writer: tokio::sync::Mutex<()>,
    persistence: Option<Arc<dyn MetadataStore>>,
}

impl SchemaRegistry {
    pub fn new(persistence: Option<Arc<dyn MetadataStore>>) -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
            writer: tokio::sync::Mutex::new(()),
            persistence,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub async fn load(&self) -> Result<usize, SchemaError> {
        let Some(store) = &self.persistence else {
            return Ok(0);
        };

        let schemas = store.load_schemas().await?;
        let count = schemas.len();

        let _writer = self.writer.lock().await;
        let mut map = self.write_map();
        for schema in schemas {
            map.insert(key(&schema.project_id, &schema.collection_name), Arc::new(schema));
        }
        info!("Loaded {} collection schemas from metadata store", count);
        Ok(count)
    }

    pub fn get(&self, project_id: &str, collection: &str) -> Option<Arc<CollectionSchema>> {
        self.read_map().get(&key(project_id, collection)).cloned()
    }

    /// Store a schema, replacing any previous one. Empty schemas clear the entry.
    pub async fn set(&self, schema: CollectionSchema) -> Result<(), SchemaError> {
        if schema.is_empty() {
            return self.clear(&schema.project_id, &schema.collection_name).await;
        }

        let _writer = self.writer.lock().await;
        if let Some(store) = &self.persistence {
            store.save_schema(&schema).await?;
        }
        self.write_map()
            .insert(key(&schema.project_id, &schema.collection_name), Arc::new(schema));
        Ok(())
    }

    pub async fn clear(&self, project_id: &str, collection: &str) -> Result<(), SchemaError> {
        let _writer = self.writer.lock().await;
        if let Some(store) = &self.persistence {
            store.delete_schema(project_id, collection).await?;
        }
        self.write_map().remove(&key(project_id, collection));
        Ok(())
    }

    /// Forget every schema that belongs to a project
    pub async fn clear_project(&self, project_id: &str) -> Result<(), SchemaError> {
        let _writer = self.writer.lock().await;
        if let Some(store) = &self.persistence {
            store.delete_project_schemas(project_id).await?;
        }
        self.write_map().retain(|(project, _), _| project != project_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<Key, Arc<CollectionSchema>>> {
        self.schemas.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<Key, Arc<CollectionSchema>>> {
        self.schemas.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(project_id: &str, collection: &str) -> Key {
    (project_id.to_string(), collection.to_string())
}
