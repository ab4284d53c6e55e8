//! Push change routing: one channel per key, debounced full reloads, and
//! the per-resource in-place fast path.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::entry::{CacheEntry, Debounce, EntryState, PushChannel};
use super::resource::{PatchOutcome, Resource};
use crate::backend::{ChangeEvent, PushSubscription};

impl<R: Resource> CacheEntry<R> {
    /// Open this key's push channel. Failure is logged and leaves the entry
    /// without realtime updates until the next acquire retries.
    pub(super) fn open_channel(self: &Arc<Self>, st: &mut EntryState<R::Data>) {
        let name = self.key.channel_name();
        let tables = self.resource.tables();
        match self.ctx.push.subscribe(&name, &tables) {
            Ok(PushSubscription { events, closer, .. }) => {
                let task = self.ctx.runtime.spawn(route_events(Arc::downgrade(self), events));
                debug!(channel = %name, tables = tables.len(), "Push channel opened");
                st.push = Some(PushChannel { name, task, closer });
            }
            Err(e) => {
                warn!(channel = %name, error = %e, "Failed to open push channel");
            }
        }
    }

    pub(super) fn handle_change(self: &Arc<Self>, event: &ChangeEvent) {
        let patched = {
            let mut st = self.state.lock();
            if st.ref_count == 0 {
                return;
            }
            // A running load may have read rows older than this event and
            // would overwrite the patch, so only patch when idle.
            let outcome = match (&st.view.data, &st.in_flight) {
                (Some(data), None) => self.resource.patch(data, event),
                _ => PatchOutcome::Reload,
            };
            match outcome {
                PatchOutcome::Patched(data) => {
                    let data = Arc::new(data);
                    st.view.data = Some(Arc::clone(&data));
                    st.view.version += 1;
                    Some((data, st.view.version))
                }
                PatchOutcome::Unchanged => return,
                PatchOutcome::Reload => None,
            }
        };

        match patched {
            Some((data, version)) => {
                debug!(key = %self.key, table = %event.table, "Patched in place");
                self.notify();
                self.persist(data, version);
            }
            None => self.schedule_reload(),
        }
    }

    /// Trailing debounce: every call restarts the window; when it elapses
    /// one forced reload runs.
    pub(super) fn schedule_reload(self: &Arc<Self>) {
        let window = self.ctx.settings.debounce;
        let mut st = self.state.lock();
        if st.ref_count == 0 {
            return;
        }
        if let Some(previous) = st.debounce.take() {
            previous.task.abort();
        }

        st.next_debounce += 1;
        let id = st.next_debounce;
        let weak = Arc::downgrade(self);
        let task = self.ctx.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            let Some(entry) = weak.upgrade() else {
                return;
            };
            {
                let mut st = entry.state.lock();
                if st.debounce.as_ref().map(|d| d.id) != Some(id) {
                    return;
                }
                st.debounce = None;
            }
            debug!(key = %entry.key, "Debounced reload");
            drop(entry.load(true));
        });
        st.debounce = Some(Debounce { id, task });
    }
}

async fn route_events<R: Resource>(entry: Weak<CacheEntry<R>>, mut events: mpsc::UnboundedReceiver<ChangeEvent>) {
    while let Some(event) = events.recv().await {
        let Some(strong) = entry.upgrade() else {
            break;
        };
        debug!(key = %strong.key, table = %event.table, kind = ?event.event_type, "Change notification");
        strong.handle_change(&event);
    }
}
