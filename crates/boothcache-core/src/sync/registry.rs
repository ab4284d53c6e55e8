//! The cache registry and consumer handles.
//!
//! The registry is an explicit instance, not a process global: two
//! registries never share entries, channels or timers.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::entry::{CacheEntry, EntryDiagnostics, ErasedEntry, Listener, LoadFuture};
use super::resource::{Resource, ResourceKey, ResourceKind, ResourceState};
use super::{Connectivity, SyncContext, SyncSettings};
use crate::backend::{Backend, PushSource};
use crate::snapshot::SnapshotStore;

struct RegistryInner {
    ctx: Arc<SyncContext>,
    entries: Mutex<HashMap<ResourceKey, Arc<dyn ErasedEntry>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
    }
}

/// Process-local map from resource key to shared cache entry.
/// Clone is cheap and every clone sees the same entries.
#[derive(Clone)]
pub struct CacheRegistry {
    inner: Arc<RegistryInner>,
}

impl CacheRegistry {
    /// Create a registry. Must be called from within a tokio runtime; loads,
    /// push routing and timers are spawned onto it.
    pub fn new(
        backend: Arc<dyn Backend>,
        push: Arc<dyn PushSource>,
        snapshots: SnapshotStore,
        connectivity: Connectivity,
        settings: SyncSettings,
    ) -> Self {
        let runtime = Handle::current();
        let changes = connectivity.subscribe();
        let ctx = Arc::new(SyncContext {
            backend,
            push,
            snapshots,
            connectivity,
            settings,
            runtime: runtime.clone(),
        });
        let inner = Arc::new(RegistryInner {
            ctx,
            entries: Mutex::new(HashMap::new()),
            watcher: Mutex::new(None),
        });

        let watcher = runtime.spawn(watch_connectivity(Arc::downgrade(&inner), changes));
        *inner.watcher.lock() = Some(watcher);

        Self { inner }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.inner.ctx.backend.as_ref()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.ctx.connectivity
    }

    pub fn settings(&self) -> SyncSettings {
        self.inner.ctx.settings
    }

    /// Look up or lazily create the entry for `resource`'s key.
    fn entry<R: Resource>(&self, resource: R) -> Arc<CacheEntry<R>> {
        let key = resource.key();
        let mut entries = self.inner.entries.lock();
        if let Some(existing) = entries.get(&key) {
            match Arc::clone(existing).into_any().downcast::<CacheEntry<R>>() {
                Ok(entry) => return entry,
                Err(_) => {
                    // Keys are per resource type; a mismatch is a programming error.
                    // Serve an unshared entry rather than corrupt the registered one.
                    error!(key = %key, "Key already registered for a different resource type");
                    return Arc::new(CacheEntry::new(resource, Arc::clone(&self.inner.ctx)));
                }
            }
        }

        let entry = Arc::new(CacheEntry::new(resource, Arc::clone(&self.inner.ctx)));
        entries.insert(key, Arc::clone(&entry) as Arc<dyn ErasedEntry>);
        debug!(key = %key, "Cache entry created");
        entry
    }

    /// Mount a consumer without a listener.
    pub fn acquire<R: Resource>(&self, resource: R) -> ResourceHandle<R> {
        self.attach(resource, None)
    }

    /// Mount a consumer whose listener is called on every state transition.
    pub fn acquire_with<R, F>(&self, resource: R, listener: F) -> ResourceHandle<R>
    where
        R: Resource,
        F: Fn(&ResourceState<R::Data>) + Send + Sync + 'static,
    {
        self.attach(resource, Some(Arc::new(listener)))
    }

    fn attach<R: Resource>(&self, resource: R, listener: Option<Listener<R::Data>>) -> ResourceHandle<R> {
        let entry = self.entry(resource);
        let listener_id = entry.attach(listener);
        ResourceHandle {
            entry,
            listener_id,
            released: false,
        }
    }

    /// Load without mounting. See [`CacheEntry::load`] for the single-flight rules.
    pub fn load<R: Resource>(&self, resource: R, force: bool) -> LoadFuture {
        self.entry(resource).load(force)
    }

    /// Current state for a key, if an entry exists.
    pub fn peek<R: Resource>(&self, resource: &R) -> Option<ResourceState<R::Data>> {
        let existing = self.inner.entries.lock().get(&resource.key()).cloned()?;
        existing
            .into_any()
            .downcast::<CacheEntry<R>>()
            .ok()
            .map(|entry| entry.state())
    }

    /// Force a reload of `key` if it has an entry.
    pub fn reload_key(&self, key: &ResourceKey) -> Option<LoadFuture> {
        let existing = self.inner.entries.lock().get(key).cloned()?;
        Some(existing.reload())
    }

    /// Force-reload every listed key that has an entry and wait for all of them.
    pub async fn reload_keys(&self, keys: impl IntoIterator<Item = ResourceKey>) {
        let loads: Vec<LoadFuture> = keys.into_iter().filter_map(|key| self.reload_key(&key)).collect();
        join_all(loads).await;
    }

    /// Keys with an entry, in stable order.
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.inner.entries.lock().keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn keys_of(&self, kind: ResourceKind) -> Vec<ResourceKey> {
        self.keys().into_iter().filter(|k| k.kind == kind).collect()
    }

    pub fn diagnostics(&self, key: &ResourceKey) -> Option<EntryDiagnostics> {
        let existing = self.inner.entries.lock().get(key).cloned()?;
        Some(existing.diagnostics())
    }
}

async fn watch_connectivity(registry: Weak<RegistryInner>, mut changes: watch::Receiver<bool>) {
    while changes.changed().await.is_ok() {
        let online = *changes.borrow_and_update();
        if !online {
            continue;
        }
        let Some(inner) = registry.upgrade() else {
            break;
        };
        let entries: Vec<Arc<dyn ErasedEntry>> = inner.entries.lock().values().cloned().collect();
        info!(entries = entries.len(), "Connectivity restored");
        for entry in entries {
            entry.reconnect();
        }
    }
}

/// A mounted consumer of one key. Dropping it releases the key.
pub struct ResourceHandle<R: Resource> {
    entry: Arc<CacheEntry<R>>,
    listener_id: u64,
    released: bool,
}

impl<R: Resource> ResourceHandle<R> {
    pub fn key(&self) -> ResourceKey {
        self.entry.key()
    }

    pub fn state(&self) -> ResourceState<R::Data> {
        self.entry.state()
    }

    pub fn data(&self) -> Option<Arc<R::Data>> {
        self.entry.state().data
    }

    /// Wait until no load is in flight, then return the state.
    pub async fn settled(&self) -> ResourceState<R::Data> {
        while let Some(flight) = self.entry.current_flight() {
            flight.await;
        }
        self.state()
    }

    /// Forced reload of this key.
    pub fn reload(&self) -> LoadFuture {
        self.entry.load(true)
    }

    pub fn diagnostics(&self) -> EntryDiagnostics {
        self.entry.diagnostics()
    }

    /// True when both handles are backed by the same cache entry.
    pub fn shares_entry_with(&self, other: &ResourceHandle<R>) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }

    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.released {
            self.released = true;
            self.entry.detach(self.listener_id);
        }
    }
}

impl<R: Resource> Drop for ResourceHandle<R> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, TableFilter};
    use crate::error::StoreError;
    use crate::resources::Companies;
    use crate::sync::CachePolicy;
    use async_trait::async_trait;
    use serde_json::json;

    /// Claims the companies key with a different data type.
    struct CompanyCount;

    #[async_trait]
    impl Resource for CompanyCount {
        type Data = usize;

        fn key(&self) -> ResourceKey {
            ResourceKey::singleton(ResourceKind::Companies)
        }

        fn policy(&self) -> CachePolicy {
            CachePolicy::RetainUntilEvicted
        }

        fn tables(&self) -> Vec<TableFilter> {
            Vec::new()
        }

        async fn fetch(&self, backend: &dyn Backend) -> Result<usize, StoreError> {
            Ok(backend.select(&crate::backend::Query::table("companies")).await?.len())
        }
    }

    fn registry(backend: &MemoryBackend) -> CacheRegistry {
        CacheRegistry::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            SnapshotStore::in_memory(),
            Connectivity::online(),
            SyncSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_key_type_mismatch_gets_unshared_entry() {
        let backend = MemoryBackend::new();
        backend.seed("companies", vec![json!({"id": 1, "name": "Acme"})]);
        let registry = registry(&backend);

        let companies = registry.acquire(Companies);
        let count = registry.acquire(CompanyCount);
        assert_eq!(count.settled().await.data.as_deref(), Some(&1));
        assert_eq!(companies.settled().await.data.expect("companies").len(), 1);

        let diagnostics = registry
            .diagnostics(&ResourceKey::singleton(ResourceKind::Companies))
            .expect("registered entry");
        assert_eq!(diagnostics.ref_count, 1);
    }

    #[tokio::test]
    async fn test_reload_key_without_entry_is_none() {
        let backend = MemoryBackend::new();
        let registry = registry(&backend);
        assert!(registry
            .reload_key(&ResourceKey::year(ResourceKind::Markers, 2026))
            .is_none());
        assert!(registry.keys().is_empty());
    }

    #[tokio::test]
    async fn test_keys_of_lists_years() {
        let backend = MemoryBackend::new();
        let registry = registry(&backend);
        drop(registry.load(crate::resources::Counts::new(2026), false));
        drop(registry.load(crate::resources::Counts::new(2025), false));
        drop(registry.load(Companies, false));

        let years: Vec<Option<i32>> = registry
            .keys_of(ResourceKind::Counts)
            .iter()
            .map(|k| k.discriminant)
            .collect();
        assert_eq!(years, vec![Some(2025), Some(2026)]);
    }
}
