//! What a cached resource is: its key, its queries, its push tables and
//! its cache policy.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::backend::{Backend, ChangeEvent, TableFilter};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Assignments,
    Companies,
    Subscriptions,
    Organization,
    Markers,
    Glyphs,
    Counts,
}

impl ResourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Assignments => "assignments",
            ResourceKind::Companies => "companies",
            ResourceKind::Subscriptions => "subscriptions",
            ResourceKind::Organization => "organization",
            ResourceKind::Markers => "markers",
            ResourceKind::Glyphs => "glyphs",
            ResourceKind::Counts => "counts",
        }
    }
}

/// Resource type plus discriminant (the event year, or none for singletons).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub discriminant: Option<i32>,
}

impl ResourceKey {
    pub fn year(kind: ResourceKind, year: i32) -> Self {
        Self {
            kind,
            discriminant: Some(year),
        }
    }

    pub fn singleton(kind: ResourceKind) -> Self {
        Self {
            kind,
            discriminant: None,
        }
    }

    /// Push channel name, unique per key (e.g. `assignments-2026`).
    pub fn channel_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.discriminant {
            Some(d) => write!(f, "{}-{}", self.kind.name(), d),
            None => f.write_str(self.kind.name()),
        }
    }
}

/// Remount behaviour, chosen per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Every acquire refetches, even when cached data exists (unless a load is already running).
    RefreshOnMount,
    /// Cached data is served as-is on remount; only push events, mutations
    /// and reconnects reload it.
    RetainUntilEvicted,
}

/// Result of offering a push event to a resource's in-place fast path.
#[derive(Debug)]
pub enum PatchOutcome<D> {
    /// The event was applied; this is the new data.
    Patched(D),
    /// The event cannot affect this view.
    Unchanged,
    /// The event needs a full (debounced) reload.
    Reload,
}

/// A cacheable view over one or more backend tables.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Data: PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn key(&self) -> ResourceKey;

    fn policy(&self) -> CachePolicy;

    /// Tables (and row filters) the push channel for this key listens to.
    fn tables(&self) -> Vec<TableFilter>;

    /// Run the raw queries and compose the result. Any failure aborts the
    /// whole load.
    async fn fetch(&self, backend: &dyn Backend) -> Result<Self::Data, StoreError>;

    /// Snapshot name for offline fallback; `None` disables snapshots.
    fn snapshot_name(&self) -> Option<String> {
        None
    }

    /// Opt-in fast path for push events. Must return `Reload` for anything
    /// that could change precedence or membership.
    fn patch(&self, _current: &Self::Data, _event: &ChangeEvent) -> PatchOutcome<Self::Data> {
        PatchOutcome::Reload
    }
}

/// Immutable view of an entry handed to handles and listeners.
#[derive(Debug)]
pub struct ResourceState<D> {
    pub data: Option<Arc<D>>,
    pub loading: bool,
    pub error: Option<String>,
    /// True while `data` came from the offline snapshot rather than the backend.
    pub from_snapshot: bool,
    /// Incremented on every transition.
    pub version: u64,
}

impl<D> ResourceState<D> {
    pub fn is_ready(&self) -> bool {
        self.data.is_some() && !self.loading
    }
}

impl<D> Default for ResourceState<D> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            from_snapshot: false,
            version: 0,
        }
    }
}

impl<D> Clone for ResourceState<D> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            loading: self.loading,
            error: self.error.clone(),
            from_snapshot: self.from_snapshot,
            version: self.version,
        }
    }
}
