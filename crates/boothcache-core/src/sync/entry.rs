//! The per-key unit of shared state.
//!
//! An entry owns the current data, the loading/error flags, the listener
//! set and reference count, the in-flight load, the pending debounce timer
//! and the push channel. Entries are created lazily by the registry and
//! never removed; dropping to zero references only closes the channel and
//! cancels the timer.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::resource::{CachePolicy, Resource, ResourceKey, ResourceState};
use super::SyncContext;
use crate::backend::PushCloser;

/// Shareable completion of a load. Every clone resolves when the load
/// has committed its result to the entry.
pub type LoadFuture = Shared<BoxFuture<'static, ()>>;

pub(crate) fn ready_load() -> LoadFuture {
    futures::future::ready(()).boxed().shared()
}

pub(super) type Listener<D> = Arc<dyn Fn(&ResourceState<D>) + Send + Sync>;

pub(super) struct InFlight {
    pub(super) id: u64,
    pub(super) future: LoadFuture,
    /// Set once the load has finished waiting on its predecessor and begun querying.
    pub(super) started: Arc<AtomicBool>,
}

pub(super) struct PushChannel {
    pub(super) name: String,
    pub(super) task: JoinHandle<()>,
    pub(super) closer: PushCloser,
}

pub(super) struct Debounce {
    pub(super) id: u64,
    pub(super) task: JoinHandle<()>,
}

pub(super) struct EntryState<D> {
    pub(super) view: ResourceState<D>,
    pub(super) listeners: Vec<(u64, Listener<D>)>,
    pub(super) next_listener: u64,
    pub(super) ref_count: usize,
    pub(super) in_flight: Option<InFlight>,
    pub(super) next_flight: u64,
    pub(super) debounce: Option<Debounce>,
    pub(super) next_debounce: u64,
    pub(super) push: Option<PushChannel>,
    /// Mounted while offline; owes one forced reload when connectivity returns.
    pub(super) awaiting_reconnect: bool,
}

impl<D> Default for EntryState<D> {
    fn default() -> Self {
        Self {
            view: ResourceState::default(),
            listeners: Vec::new(),
            next_listener: 0,
            ref_count: 0,
            in_flight: None,
            next_flight: 0,
            debounce: None,
            next_debounce: 0,
            push: None,
            awaiting_reconnect: false,
        }
    }
}

/// Point-in-time counters for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDiagnostics {
    pub key: ResourceKey,
    pub ref_count: usize,
    pub listeners: usize,
    pub channel: Option<String>,
    pub loading: bool,
    pub in_flight: bool,
    pub debounce_pending: bool,
}

pub struct CacheEntry<R: Resource> {
    pub(super) resource: R,
    pub(super) key: ResourceKey,
    pub(super) ctx: Arc<SyncContext>,
    pub(super) state: Mutex<EntryState<R::Data>>,
}

impl<R: Resource> CacheEntry<R> {
    pub(super) fn new(resource: R, ctx: Arc<SyncContext>) -> Self {
        let key = resource.key();
        Self {
            resource,
            key,
            ctx,
            state: Mutex::new(EntryState::default()),
        }
    }

    pub fn key(&self) -> ResourceKey {
        self.key
    }

    pub fn state(&self) -> ResourceState<R::Data> {
        self.state.lock().view.clone()
    }

    pub fn diagnostics(&self) -> EntryDiagnostics {
        let st = self.state.lock();
        EntryDiagnostics {
            key: self.key,
            ref_count: st.ref_count,
            listeners: st.listeners.len(),
            channel: st.push.as_ref().map(|p| p.name.clone()),
            loading: st.view.loading,
            in_flight: st.in_flight.is_some(),
            debounce_pending: st.debounce.is_some(),
        }
    }

    pub(super) fn current_flight(&self) -> Option<LoadFuture> {
        self.state.lock().in_flight.as_ref().map(|f| f.future.clone())
    }

    /// Single-flight load.
    ///
    /// Without `force`, an in-flight load is reused and existing data is
    /// served without a query. With `force`, a load that has not started
    /// querying yet is reused; one that is already querying gets a
    /// successor that starts after it completes, so two loads for one key
    /// never overlap.
    pub fn load(self: &Arc<Self>, force: bool) -> LoadFuture {
        let (future, notify) = {
            let mut st = self.state.lock();
            self.plan_load(&mut st, force)
        };
        if notify {
            self.notify();
        }
        future
    }

    fn plan_load(self: &Arc<Self>, st: &mut EntryState<R::Data>, force: bool) -> (LoadFuture, bool) {
        if let Some(flight) = &st.in_flight {
            if !force || !flight.started.load(Ordering::SeqCst) {
                return (flight.future.clone(), false);
            }
            let previous = flight.future.clone();
            debug!(key = %self.key, "Queueing forced reload behind in-flight load");
            return (self.start_flight(st, Some(previous)), false);
        }

        if !force && st.view.data.is_some() {
            return (ready_load(), false);
        }

        let future = self.start_flight(st, None);
        st.view.loading = true;
        st.view.error = None;
        st.view.version += 1;
        (future, true)
    }

    fn start_flight(self: &Arc<Self>, st: &mut EntryState<R::Data>, after: Option<LoadFuture>) -> LoadFuture {
        st.next_flight += 1;
        let id = st.next_flight;
        let started = Arc::new(AtomicBool::new(false));

        let entry = Arc::clone(self);
        let started_flag = Arc::clone(&started);
        let future = async move {
            if let Some(previous) = after {
                previous.await;
            }
            started_flag.store(true, Ordering::SeqCst);
            entry.run_fetch(id).await;
        }
        .boxed()
        .shared();

        st.in_flight = Some(InFlight {
            id,
            future: future.clone(),
            started,
        });
        // Loads run to completion even if every consumer goes away.
        self.ctx.runtime.spawn(future.clone());
        future
    }

    async fn run_fetch(self: Arc<Self>, id: u64) {
        self.update(|st| {
            if st.view.loading && st.view.error.is_none() {
                return false;
            }
            st.view.loading = true;
            st.view.error = None;
            true
        });

        debug!(key = %self.key, "Loading");
        let result = self.resource.fetch(self.ctx.backend.as_ref()).await;

        let mut committed = None;
        self.update(|st| {
            let successor_queued = st.in_flight.as_ref().is_some_and(|f| f.id != id);
            if !successor_queued {
                st.in_flight = None;
            }
            st.view.loading = successor_queued;

            match result {
                Ok(data) => {
                    let unchanged = st.view.data.as_deref().is_some_and(|current| *current == data);
                    if !unchanged {
                        st.view.data = Some(Arc::new(data));
                    }
                    st.view.error = None;
                    st.view.from_snapshot = false;
                    // `update` bumps the version once this closure returns true.
                    committed = st.view.data.clone().map(|data| (data, st.view.version + 1));
                }
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Load failed, keeping previous data");
                    st.view.error = Some(e.to_string());
                }
            }
            true
        });

        if let Some((data, version)) = committed {
            debug!(key = %self.key, version = version, "Load committed");
            self.persist(data, version);
        }
    }

    /// Write the snapshot off the notifying path. `version` is the entry
    /// version the data was committed at; the store drops writes older than
    /// one it already holds. Failures are logged by the store.
    pub(super) fn persist(&self, data: Arc<R::Data>, version: u64) {
        let Some(name) = self.resource.snapshot_name() else {
            return;
        };
        let store = self.ctx.snapshots.clone();
        self.ctx.runtime.spawn_blocking(move || {
            store.write_versioned(&name, version, &*data);
        });
    }

    /// Register a consumer. Returns the listener id used to detach it.
    pub(super) fn attach(self: &Arc<Self>, listener: Option<Listener<R::Data>>) -> u64 {
        let (listener_id, notify) = {
            let mut st = self.state.lock();
            st.ref_count += 1;
            st.next_listener += 1;
            let listener_id = st.next_listener;
            if let Some(listener) = listener {
                st.listeners.push((listener_id, listener));
            }

            if st.push.is_none() {
                self.open_channel(&mut st);
            }

            let online = self.ctx.connectivity.is_online();
            let mut notify = false;
            if !online {
                st.awaiting_reconnect = true;
                if st.view.data.is_none() {
                    notify = self.serve_snapshot(&mut st);
                }
            }

            let owed_reconnect = online && st.awaiting_reconnect;
            if owed_reconnect {
                st.awaiting_reconnect = false;
            }

            let wants_fetch = if !online && st.view.from_snapshot {
                false
            } else if owed_reconnect {
                true
            } else {
                match self.resource.policy() {
                    CachePolicy::RefreshOnMount => true,
                    CachePolicy::RetainUntilEvicted => st.view.data.is_none(),
                }
            };

            if wants_fetch && st.in_flight.is_none() {
                let (_future, started) = self.plan_load(&mut st, true);
                notify |= started;
            }
            (listener_id, notify)
        };

        if notify {
            self.notify();
        }
        listener_id
    }

    fn serve_snapshot(&self, st: &mut EntryState<R::Data>) -> bool {
        let Some(name) = self.resource.snapshot_name() else {
            return false;
        };
        match self.ctx.snapshots.read::<R::Data>(&name) {
            Some(snapshot) => {
                info!(key = %self.key, age = %snapshot.age_display(), "Offline, serving snapshot");
                st.view.data = Some(Arc::new(snapshot.data));
                st.view.loading = false;
                st.view.error = None;
                st.view.from_snapshot = true;
                st.view.version += 1;
                true
            }
            None => {
                debug!(key = %self.key, "Offline with no snapshot");
                false
            }
        }
    }

    /// Unregister a consumer. The last one out closes the push channel and
    /// cancels any pending reload; data and error are kept.
    pub(super) fn detach(&self, listener_id: u64) {
        let teardown = {
            let mut st = self.state.lock();
            st.listeners.retain(|(id, _)| *id != listener_id);
            st.ref_count = st.ref_count.saturating_sub(1);
            if st.ref_count == 0 {
                Some((st.push.take(), st.debounce.take()))
            } else {
                None
            }
        };

        if let Some((push, debounce)) = teardown {
            if let Some(debounce) = debounce {
                debounce.task.abort();
            }
            if let Some(channel) = push {
                channel.task.abort();
                channel.closer.close();
            }
            debug!(key = %self.key, "Last consumer released");
        }
    }

    /// Apply a state change and, if it reports a change, notify listeners.
    pub(super) fn update(&self, f: impl FnOnce(&mut EntryState<R::Data>) -> bool) {
        let changed = {
            let mut st = self.state.lock();
            let changed = f(&mut st);
            if changed {
                st.view.version += 1;
            }
            changed
        };
        if changed {
            self.notify();
        }
    }

    /// Deliver the current state to every listener, outside the lock.
    pub(super) fn notify(&self) {
        let (view, listeners) = {
            let st = self.state.lock();
            let listeners: Vec<Listener<R::Data>> = st.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (st.view.clone(), listeners)
        };
        for listener in listeners {
            listener(&view);
        }
    }
}

/// Type-erased view of an entry, for registry-wide operations.
pub(super) trait ErasedEntry: Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn reload(self: Arc<Self>) -> LoadFuture;
    fn reconnect(self: Arc<Self>);
    fn diagnostics(&self) -> EntryDiagnostics;
}

impl<R: Resource> ErasedEntry for CacheEntry<R> {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn reload(self: Arc<Self>) -> LoadFuture {
        self.load(true)
    }

    fn reconnect(self: Arc<Self>) {
        let due = {
            let mut st = self.state.lock();
            if st.awaiting_reconnect && st.ref_count > 0 {
                st.awaiting_reconnect = false;
                true
            } else {
                false
            }
        };
        if due {
            info!(key = %self.key, "Back online, reloading");
            drop(self.load(true));
        }
    }

    fn diagnostics(&self) -> EntryDiagnostics {
        CacheEntry::diagnostics(self)
    }
}
