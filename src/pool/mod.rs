//! Connection pool: at most one live document-store handle per project.
//!
//! Each project gets a slot guarded by an async mutex. The first request for a
//! project connects while holding the slot lock, so concurrent first requests
//! wait for that connect instead of racing their own. Operations run through a
//! [`Lease`] that bounds them with a timeout and evicts the handle when it
//! times out or reports a broken connection; the next acquire reconnects.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::registry::ProjectRegistry;
use crate::store::{ConnectionParams, Connector, Document, DocumentStore, StoreError};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Project not found: {0}")]
    UnknownProject(String),

    #[error("Could not connect to project database: {0}")]
    Connect(StoreError),

    #[error("Project database did not respond within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub idle_timeout: Duration,
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            operation_timeout: config.operation_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

struct Handle {
    store: Arc<dyn DocumentStore>,
    params: ConnectionParams,
    broken: AtomicBool,
    last_used: Mutex<Instant>,
}

impl Handle {
    fn is_usable(&self, params: &ConnectionParams) -> bool {
        !self.broken.load(Ordering::SeqCst) && &self.params == params
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().unwrap_or_else(PoisonError::into_inner).elapsed()
    }
}

#[derive(Default)]
struct Slot {
    handle: tokio::sync::Mutex<Option<Arc<Handle>>>,
}

pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    projects: Arc<ProjectRegistry>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    settings: PoolSettings,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, projects: Arc<ProjectRegistry>, settings: PoolSettings) -> Self {
        Self {
            connector,
            projects,
            slots: Mutex::new(HashMap::new()),
            settings,
        }
    }

    /// Borrow the project's handle, connecting first if there is none
    pub async fn acquire(&self, project_id: &str) -> Result<Lease, PoolError> {
        loop {
            let project = self
                .projects
                .get(project_id)
                .ok_or_else(|| PoolError::UnknownProject(project_id.to_string()))?;
            let params = project.connection_params();
            let slot = self.slot(project_id);

            let mut current = slot.handle.lock().await;
            // The slot was retired while we waited for it
            if !self.is_current(project_id, &slot) {
                continue;
            }

            if let Some(handle) = current.as_ref().filter(|h| h.is_usable(&params)) {
                handle.touch();
                return Ok(self.lease(slot.clone(), handle.clone()));
            }
            if current.take().is_some() {
                debug!("Replacing stale handle for project {}", project_id);
            }

            let store = match tokio::time::timeout(self.settings.connect_timeout, self.connector.connect(&params)).await {
                Ok(Ok(store)) => store,
                Ok(Err(e)) => {
                    warn!("Connect to {} for project {} failed: {}", params.address(), project_id, e);
                    return Err(PoolError::Connect(e));
                }
                Err(_) => {
                    warn!("Connect to {} for project {} timed out", params.address(), project_id);
                    return Err(PoolError::Timeout(self.settings.connect_timeout));
                }
            };

            info!("Opened connection to {} for project {}", params.address(), project_id);
            let handle = Arc::new(Handle {
                store,
                params,
                broken: AtomicBool::new(false),
                last_used: Mutex::new(Instant::now()),
            });
            *current = Some(handle.clone());
            return Ok(self.lease(slot.clone(), handle));
        }
    }

    /// Close the project's handle; in-flight leases finish on the old one.
    /// The slot itself stays unless the project is gone.
    pub async fn evict(&self, project_id: &str) -> bool {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .cloned();
        let Some(slot) = slot else {
            return false;
        };

        let mut handle = slot.handle.lock().await;
        let evicted = handle.take().is_some();
        if self.projects.get(project_id).is_none() {
            self.retire(project_id, &slot);
        }
        drop(handle);

        if evicted {
            info!("Closed connection for project {}", project_id);
        }
        evicted
    }

    /// Close handles unused for longer than the idle timeout and retire slots
    /// of projects that no longer exist. Busy slots are skipped.
    pub fn evict_idle(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut closed = 0;

        slots.retain(|project_id, slot| {
            let Ok(mut handle) = slot.handle.try_lock() else {
                return true;
            };
            let orphaned = self.projects.get(project_id).is_none();
            let idle = handle
                .as_ref()
                .is_some_and(|h| h.idle_for() >= self.settings.idle_timeout);

            if (orphaned || idle) && handle.take().is_some() {
                debug!("Reaped idle connection for project {}", project_id);
                closed += 1;
            }
            !orphaned
        });

        closed
    }

    /// Run [`evict_idle`](Self::evict_idle) every `interval` until the task is aborted
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let closed = self.evict_idle();
                if closed > 0 {
                    info!("Reaped {} idle project connections", closed);
                }
            }
        })
    }

    /// Number of projects that currently hold an open handle
    pub async fn live_handles(&self) -> usize {
        let slots: Vec<Arc<Slot>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut live = 0;
        for slot in slots {
            if slot.handle.lock().await.is_some() {
                live += 1;
            }
        }
        live
    }

    fn slot(&self, project_id: &str) -> Arc<Slot> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }

    fn is_current(&self, project_id: &str, slot: &Arc<Slot>) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .is_some_and(|s| Arc::ptr_eq(s, slot))
    }

    fn retire(&self, project_id: &str, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(project_id).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(project_id);
        }
    }

    fn lease(&self, slot: Arc<Slot>, handle: Arc<Handle>) -> Lease {
        Lease {
            slot,
            handle,
            operation_timeout: self.settings.operation_timeout,
        }
    }
}

/// A borrowed handle. Every call is bounded by the operation timeout.
pub struct Lease {
    slot: Arc<Slot>,
    handle: Arc<Handle>,
    operation_timeout: Duration,
}

impl Lease {
    pub async fn ping(&self) -> Result<(), PoolError> {
        self.guard(self.handle.store.ping()).await
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, PoolError> {
        self.guard(self.handle.store.list_collections()).await
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool, PoolError> {
        Ok(self.list_collections().await?.iter().any(|c| c == name))
    }

    pub async fn create_collection(&self, name: &str) -> Result<(), PoolError> {
        self.guard(self.handle.store.create_collection(name)).await
    }

    pub async fn drop_collection(&self, name: &str) -> Result<(), PoolError> {
        self.guard(self.handle.store.drop_collection(name)).await
    }

    pub async fn find_all(&self, collection: &str) -> Result<Vec<Document>, PoolError> {
        self.guard(self.handle.store.find_all(collection)).await
    }

    pub async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>, PoolError> {
        self.guard(self.handle.store.find_one(collection, id)).await
    }

    pub async fn insert(&self, collection: &str, document: Document) -> Result<Document, PoolError> {
        self.guard(self.handle.store.insert(collection, document)).await
    }

    pub async fn replace(&self, collection: &str, id: &str, document: Document) -> Result<Option<Document>, PoolError> {
        self.guard(self.handle.store.replace(collection, id, document)).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool, PoolError> {
        self.guard(self.handle.store.delete(collection, id)).await
    }

    async fn guard<T, F>(&self, operation: F) -> Result<T, PoolError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.operation_timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.breaks_handle() => {
                warn!("Connection to {} broke: {}", self.handle.params.address(), e);
                self.invalidate().await;
                Err(PoolError::Store(e))
            }
            Ok(Err(e)) => Err(PoolError::Store(e)),
            Err(_) => {
                warn!(
                    "Operation on {} exceeded {:?}",
                    self.handle.params.address(),
                    self.operation_timeout
                );
                self.invalidate().await;
                Err(PoolError::Timeout(self.operation_timeout))
            }
        }
    }

    /// Mark the handle broken and remove it, unless it was already replaced
    async fn invalidate(&self) {
        self.handle.broken.store(true, Ordering::SeqCst);
        let mut current = self.slot.handle.lock().await;
        if current.as_ref().is_some_and(|h| Arc::ptr_eq(h, &self.handle)) {
            *current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ProjectInput, ProjectPatch};
    use crate::store::memory::MemoryConnector;
    use serde_json::json;

    fn settings() -> PoolSettings {
        PoolSettings {
            connect_timeout: Duration::from_millis(500),
            operation_timeout: Duration::from_millis(200),
            idle_timeout: Duration::from_secs(60),
        }
    }

    async fn setup(connector: Arc<MemoryConnector>) -> (Arc<ConnectionPool>, Arc<ProjectRegistry>, String) {
        let registry = Arc::new(ProjectRegistry::in_memory());
        let input = ProjectInput {
            db_host: Some("db.local".into()),
            db_name: Some("shop".into()),
            ..Default::default()
        };
        let project = registry.create(input, "key".into(), "hash".into()).await.unwrap();
        let pool = Arc::new(ConnectionPool::new(connector, registry.clone(), settings()));
        (pool, registry, project.id.clone())
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_connect() {
        let connector = Arc::new(MemoryConnector::new().with_connect_delay(Duration::from_millis(50)));
        let (pool, _, id) = setup(connector.clone()).await;

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                let id = id.clone();
                tokio::spawn(async move { pool.acquire(&id).await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(connector.connect_count(), 1);
        assert_eq!(pool.live_handles().await, 1);
    }

    #[tokio::test]
    async fn unknown_projects_are_rejected() {
        let (pool, _, _) = setup(Arc::new(MemoryConnector::new())).await;
        assert!(matches!(
            pool.acquire("nope").await,
            Err(PoolError::UnknownProject(_))
        ));
    }

    #[tokio::test]
    async fn broken_connections_are_replaced() {
        let connector = Arc::new(MemoryConnector::new());
        let (pool, _, id) = setup(connector.clone()).await;

        let lease = pool.acquire(&id).await.unwrap();
        connector.set_offline("db.local", true);
        assert!(matches!(lease.ping().await, Err(PoolError::Store(_))));
        assert_eq!(pool.live_handles().await, 0);
        assert!(matches!(pool.acquire(&id).await, Err(PoolError::Connect(_))));

        connector.set_offline("db.local", false);
        pool.acquire(&id).await.unwrap().ping().await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_operations_time_out_and_evict() {
        let connector = Arc::new(MemoryConnector::new());
        let (pool, _, id) = setup(connector.clone()).await;

        let lease = pool.acquire(&id).await.unwrap();
        connector.set_stalled("db.local", true);
        assert!(matches!(lease.find_all("posts").await, Err(PoolError::Timeout(_))));
        assert_eq!(pool.live_handles().await, 0);

        connector.set_stalled("db.local", false);
        let lease = pool.acquire(&id).await.unwrap();
        lease.insert("posts", json!({ "n": 1 }).as_object().cloned().unwrap()).await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn changed_connection_parameters_reconnect() {
        let connector = Arc::new(MemoryConnector::new());
        let (pool, registry, id) = setup(connector.clone()).await;
        pool.acquire(&id).await.unwrap();

        let patch = ProjectPatch {
            db_name: Some("other".into()),
            ..Default::default()
        };
        registry.update(&id, &patch).await.unwrap();
        pool.acquire(&id).await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_handles_are_reaped() {
        let connector = Arc::new(MemoryConnector::new());
        let (pool, _, id) = setup(connector.clone()).await;
        pool.acquire(&id).await.unwrap();

        assert_eq!(pool.evict_idle(), 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(pool.evict_idle(), 1);
        assert_eq!(pool.live_handles().await, 0);
    }

    #[tokio::test]
    async fn evict_closes_the_handle() {
        let (pool, _, id) = setup(Arc::new(MemoryConnector::new())).await;
        pool.acquire(&id).await.unwrap();
        assert!(pool.evict(&id).await);
        assert!(!pool.evict(&id).await);
    }

    fn slot_count(pool: &ConnectionPool) -> usize {
        pool.slots.lock().unwrap().len()
    }

    #[tokio::test(start_paused = true)]
    async fn evicting_during_a_connect_keeps_one_slot() {
        let connector = Arc::new(MemoryConnector::new().with_connect_delay(Duration::from_millis(50)));
        let (pool, _, id) = setup(connector.clone()).await;

        let first = {
            let (pool, id) = (pool.clone(), id.clone());
            tokio::spawn(async move { pool.acquire(&id).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let evicting = {
            let (pool, id) = (pool.clone(), id.clone());
            tokio::spawn(async move { pool.evict(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.acquire(&id).await.unwrap();
        first.await.unwrap().unwrap();
        assert!(evicting.await.unwrap());

        assert_eq!(slot_count(&pool), 1);
        assert_eq!(pool.live_handles().await, 1);
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_reaping_keeps_the_slot() {
        let (pool, _, id) = setup(Arc::new(MemoryConnector::new())).await;
        pool.acquire(&id).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(pool.evict_idle(), 1);
        assert_eq!(slot_count(&pool), 1);
    }

    #[tokio::test]
    async fn deleted_projects_lose_their_slot() {
        let (pool, registry, id) = setup(Arc::new(MemoryConnector::new())).await;
        pool.acquire(&id).await.unwrap();

        registry.delete(&id).await.unwrap();
        assert!(pool.evict(&id).await);
        assert_eq!(slot_count(&pool), 0);
        assert!(matches!(pool.acquire(&id).await, Err(PoolError::UnknownProject(_))));
    }
}
