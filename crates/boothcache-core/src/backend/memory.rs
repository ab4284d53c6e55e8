//! In-process backend implementing both the query and the push contract.
//!
//! Every write emits a [`ChangeEvent`] to each open channel whose table
//! filters match, the same way the remote store's realtime feed does.
//! Per-table select counters, channel counters, injectable latency and
//! injectable failures make it the harness for cache behaviour tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::{Backend, ChangeEvent, ChangeKind, Filter, PushCloser, PushSource, PushSubscription, Query, TableFilter};
use crate::error::StoreError;

struct Subscriber {
    id: u64,
    channel: String,
    tables: Vec<TableFilter>,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Value>>,
    selects: HashMap<String, usize>,
    select_log: Vec<String>,
    failing: HashSet<String>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    channels_opened: usize,
    latency: Option<Duration>,
}

/// Clone shares the same tables and channels.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a table's rows without emitting change events.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.state.lock().tables.insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of selects issued against `table`.
    pub fn select_count(&self, table: &str) -> usize {
        self.state.lock().selects.get(table).copied().unwrap_or(0)
    }

    /// Tables selected from, in call order.
    pub fn select_log(&self) -> Vec<String> {
        self.state.lock().select_log.clone()
    }

    pub fn reset_counters(&self) {
        let mut state = self.state.lock();
        state.selects.clear();
        state.select_log.clear();
    }

    /// Make every operation on `table` fail until [`MemoryBackend::heal`].
    pub fn fail_table(&self, table: &str) {
        self.state.lock().failing.insert(table.to_string());
    }

    pub fn heal(&self, table: &str) {
        self.state.lock().failing.remove(table);
    }

    /// Delay every select by `latency` (tokio time, so paused clocks apply).
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Names of the channels currently open.
    pub fn open_channels(&self) -> Vec<String> {
        self.state.lock().subscribers.iter().map(|s| s.channel.clone()).collect()
    }

    /// Total channels ever opened.
    pub fn channels_opened(&self) -> usize {
        self.state.lock().channels_opened
    }

    /// Deliver an event as if it came from the store.
    pub fn emit(&self, event: ChangeEvent) {
        let mut state = self.state.lock();
        Self::dispatch(&mut state, &event);
    }

    fn dispatch(state: &mut MemoryState, event: &ChangeEvent) {
        state.subscribers.retain(|sub| {
            if !sub.tables.iter().any(|t| t.matches(event)) {
                return true;
            }
            // A closed receiver means the consumer went away without closing.
            sub.tx.send(event.clone()).is_ok()
        });
    }

    fn check_failing(state: &MemoryState, table: &str) -> Result<(), StoreError> {
        if state.failing.contains(table) {
            return Err(StoreError::Server(format!("injected failure on {}", table)));
        }
        Ok(())
    }

    fn next_id(rows: &[Value]) -> i64 {
        rows.iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .max()
            .map_or(1, |max| max.max(0) + 1)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError> {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        *state.selects.entry(query.table.clone()).or_insert(0) += 1;
        state.select_log.push(query.table.clone());
        Self::check_failing(&state, &query.table)?;

        let mut rows: Vec<Value> = state
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();
        query.sort(&mut rows);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let mut state = self.state.lock();
        Self::check_failing(&state, table)?;

        let Value::Object(mut fields) = row else {
            return Err(StoreError::InvalidResponse(format!("Insert into {} needs an object", table)));
        };
        let rows = state.tables.entry(table.to_string()).or_default();
        if fields.get("id").map_or(true, Value::is_null) {
            fields.insert("id".to_string(), Value::from(Self::next_id(rows)));
        }
        let stored = Value::Object(fields);
        rows.push(stored.clone());

        let event = ChangeEvent::new(ChangeKind::Insert, table, Some(stored.clone()), None);
        Self::dispatch(&mut state, &event);
        Ok(stored)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<Vec<Value>, StoreError> {
        let mut state = self.state.lock();
        Self::check_failing(&state, table)?;

        let patch: Map<String, Value> = match patch {
            Value::Object(map) => map,
            _ => return Err(StoreError::InvalidResponse(format!("Update of {} needs an object", table))),
        };

        let mut changes = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| filters.iter().all(|f| f.matches(r))) {
                let old = row.clone();
                if let Value::Object(fields) = &mut *row {
                    for (k, v) in &patch {
                        fields.insert(k.clone(), v.clone());
                    }
                }
                changes.push((old, row.clone()));
            }
        }

        let mut updated = Vec::with_capacity(changes.len());
        for (old, new) in changes {
            let event = ChangeEvent::new(ChangeKind::Update, table, Some(new.clone()), Some(old));
            Self::dispatch(&mut state, &event);
            updated.push(new);
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        Self::check_failing(&state, table)?;

        let mut removed = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|r| filters.iter().all(|f| f.matches(r)));
            *rows = kept;
            removed = gone;
        }

        for old in &removed {
            let event = ChangeEvent::new(ChangeKind::Delete, table, None, Some(old.clone()));
            Self::dispatch(&mut state, &event);
        }
        Ok(removed.len() as u64)
    }
}

impl PushSource for MemoryBackend {
    fn subscribe(&self, channel: &str, tables: &[TableFilter]) -> Result<PushSubscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state.lock();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.channels_opened += 1;
            state.subscribers.push(Subscriber {
                id,
                channel: channel.to_string(),
                tables: tables.to_vec(),
                tx,
            });
            id
        };
        debug!(channel = channel, tables = tables.len(), "Memory push channel opened");

        let state = Arc::clone(&self.state);
        let closer = PushCloser::new(channel, move || {
            state.lock().subscribers.retain(|s| s.id != id);
        });

        Ok(PushSubscription {
            channel: channel.to_string(),
            events: rx,
            closer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_next_id_and_emits() {
        let backend = MemoryBackend::new();
        backend.seed("companies", vec![json!({"id": 4, "name": "A"})]);
        let mut sub = backend
            .subscribe("companies", &[TableFilter::all("companies")])
            .expect("subscribe");

        let row = backend
            .insert("companies", json!({"name": "B"}))
            .await
            .expect("insert");
        assert_eq!(row["id"], json!(5));

        let event = sub.events.recv().await.expect("event");
        assert_eq!(event.event_type, ChangeKind::Insert);
        assert_eq!(event.new, Some(row));
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_counts() {
        let backend = MemoryBackend::new();
        backend.seed(
            "assignments",
            vec![
                json!({"id": 2, "marker_id": 7, "event_year": 2026}),
                json!({"id": 1, "marker_id": 7, "event_year": 2026}),
                json!({"id": 3, "marker_id": 1, "event_year": 2025}),
            ],
        );
        let query = Query::table("assignments")
            .eq("event_year", 2026)
            .order("marker_id", true)
            .order("id", true);
        let rows = backend.select(&query).await.expect("select");
        let ids: Vec<i64> = rows.iter().filter_map(|r| r["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(backend.select_count("assignments"), 1);
    }

    #[tokio::test]
    async fn test_closing_channel_stops_delivery() {
        let backend = MemoryBackend::new();
        let sub = backend
            .subscribe("markers-2026", &[TableFilter::year("markers_core", 2026)])
            .expect("subscribe");
        assert_eq!(backend.open_channels(), vec!["markers-2026".to_string()]);

        sub.closer.close();
        assert!(backend.open_channels().is_empty());
        assert_eq!(backend.channels_opened(), 1);
    }

    #[tokio::test]
    async fn test_failing_table() {
        let backend = MemoryBackend::new();
        backend.fail_table("companies");
        assert!(backend.select(&Query::table("companies")).await.is_err());
        assert!(backend.insert("companies", json!({"name": "x"})).await.is_err());
        backend.heal("companies");
        assert!(backend.select(&Query::table("companies")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_and_delete_emit_old_rows() {
        let backend = MemoryBackend::new();
        backend.seed("companies", vec![json!({"id": 1, "name": "Old"})]);
        let mut sub = backend
            .subscribe("companies", &[TableFilter::all("companies")])
            .expect("subscribe");

        let updated = backend
            .update("companies", &[Filter::eq("id", 1)], json!({"name": "New"}))
            .await
            .expect("update");
        assert_eq!(updated[0]["name"], json!("New"));
        let event = sub.events.recv().await.expect("update event");
        assert_eq!(event.old.as_ref().map(|o| o["name"].clone()), Some(json!("Old")));

        let removed = backend.delete("companies", &[Filter::eq("id", 1)]).await.expect("delete");
        assert_eq!(removed, 1);
        let event = sub.events.recv().await.expect("delete event");
        assert_eq!(event.event_type, ChangeKind::Delete);
        assert!(backend.rows("companies").is_empty());
    }
}
