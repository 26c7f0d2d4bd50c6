//! In-process document store.
//!
//! Used for local development (`DOCUMENT_STORE=memory`) and by the test
//! suite. Databases live inside the connector and are keyed by
//! `host:port/db`, so reconnecting to the same parameters sees the same data.
//! The connector counts connects and can simulate outages and stalls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{ConnectionParams, Connector, Document, DocumentStore, StoreError, ID_FIELD};

#[derive(Default)]
struct Faults {
    offline: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
}

impl Faults {
    fn is_offline(&self, host: &str) -> bool {
        self.offline.lock().unwrap_or_else(PoisonError::into_inner).contains(host)
    }

    fn is_stalled(&self, host: &str) -> bool {
        self.stalled.lock().unwrap_or_else(PoisonError::into_inner).contains(host)
    }
}

#[derive(Default)]
pub struct MemoryDatabase {
    collections: RwLock<BTreeMap<String, BTreeMap<String, Document>>>,
    next_id: AtomicU64,
}

impl MemoryDatabase {
    fn generate_id(&self) -> String {
        // 24 hex characters, ordered by creation like an ObjectId
        let seconds = Utc::now().timestamp() as u32;
        let counter = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{:08x}{:016x}", seconds, counter)
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[derive(Default)]
pub struct MemoryConnector {
    databases: Mutex<HashMap<String, Arc<MemoryDatabase>>>,
    faults: Arc<Faults>,
    connects: AtomicUsize,
    connect_delay: Option<Duration>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every connect, widening the window in which callers can race
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Refuse connects and fail operations for every database on `host`
    pub fn set_offline(&self, host: &str, offline: bool) {
        toggle(&self.faults.offline, host, offline);
    }

    /// Make operations on `host` hang until the caller gives up
    pub fn set_stalled(&self, host: &str, stalled: bool) {
        toggle(&self.faults.stalled, host, stalled);
    }

    /// The database behind a set of parameters, created on first access
    pub fn database(&self, params: &ConnectionParams) -> Arc<MemoryDatabase> {
        self.databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(params.address())
            .or_default()
            .clone()
    }
}

fn toggle(set: &Mutex<HashSet<String>>, host: &str, on: bool) {
    let mut set = set.lock().unwrap_or_else(PoisonError::into_inner);
    if on {
        set.insert(host.to_string());
    } else {
        set.remove(host);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn DocumentStore>, StoreError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.is_offline(&params.host) {
            return Err(StoreError::Connection(format!("{} is unreachable", params.address())));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryStore {
            host: params.host.clone(),
            database: self.database(params),
            faults: self.faults.clone(),
        }))
    }
}

pub struct MemoryStore {
    host: String,
    database: Arc<MemoryDatabase>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    async fn check(&self) -> Result<(), StoreError> {
        if self.faults.is_stalled(&self.host) {
            futures::future::pending::<()>().await;
        }
        if self.faults.is_offline(&self.host) {
            return Err(StoreError::Connection(format!("connection to {} reset", self.host)));
        }
        Ok(())
    }

    fn write_documents<T>(
        &self,
        collection: &str,
        create_missing: bool,
        f: impl FnOnce(&mut BTreeMap<String, Document>) -> T,
    ) -> Option<T> {
        let mut collections = self
            .database
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if create_missing {
            // Like MongoDB, inserting into a missing collection creates it
            Some(f(collections.entry(collection.to_string()).or_default()))
        } else {
            collections.get_mut(collection).map(f)
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check().await
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.check().await?;
        Ok(self.database.collection_names())
    }

    async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        self.check().await?;
        let mut collections = self
            .database
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        self.check().await?;
        self.database
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.check().await?;
        let collections = self
            .database
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check().await?;
        let collections = self
            .database
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn insert(&self, collection: &str, mut document: Document) -> Result<Document, StoreError> {
        self.check().await?;
        let id = self.database.generate_id();
        document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        self.write_documents(collection, true, |docs| {
            docs.insert(id, document.clone());
            document
        })
        .ok_or_else(|| StoreError::Driver(format!("collection {} unavailable", collection)))
    }

    async fn replace(&self, collection: &str, id: &str, mut document: Document) -> Result<Option<Document>, StoreError> {
        self.check().await?;
        document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        Ok(self
            .write_documents(collection, false, |docs| {
                docs.get_mut(id).map(|existing| {
                    *existing = document.clone();
                    document
                })
            })
            .flatten())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.check().await?;
        Ok(self
            .write_documents(collection, false, |docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }
}
