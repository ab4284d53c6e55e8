//! Shared reactive cache and realtime synchronization.
//!
//! A [`CacheRegistry`] maps each [`ResourceKey`] to one cache entry shared
//! by every consumer of that key. Consumers hold a [`ResourceHandle`];
//! while at least one handle exists the key has exactly one push channel
//! open, and change notifications trigger a debounced full reload.
//! Loads are single-flight per key.

pub mod connectivity;
pub mod entry;
mod push;
pub mod registry;
pub mod resource;

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

pub use connectivity::Connectivity;
pub use entry::{EntryDiagnostics, LoadFuture};
pub use registry::{CacheRegistry, ResourceHandle};
pub use resource::{CachePolicy, PatchOutcome, Resource, ResourceKey, ResourceKind, ResourceState};

use crate::backend::{Backend, PushSource};
use crate::snapshot::SnapshotStore;

/// Default trailing debounce window for push-triggered reloads.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub debounce: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

/// Collaborators shared by every entry of one registry.
pub(crate) struct SyncContext {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) push: Arc<dyn PushSource>,
    pub(crate) snapshots: SnapshotStore,
    pub(crate) connectivity: Connectivity,
    pub(crate) settings: SyncSettings,
    pub(crate) runtime: Handle,
}
