//! Backend contracts and adapters.
//!
//! The cache layer talks to the remote relational store through two seams:
//!
//! - [`Backend`]: table-scoped select/insert/update/delete
//! - [`PushSource`]: per-channel row change notifications
//!
//! `RestClient` implements `Backend` over HTTP; `MemoryBackend` implements
//! both in process and is what the tests run against.

pub mod change;
pub mod memory;
pub mod query;
pub mod rest;

pub use change::{ChangeEvent, ChangeKind, PushCloser, PushSubscription, TableFilter};
pub use memory::MemoryBackend;
pub use query::{Filter, Order, Query};
pub use rest::RestClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;

/// Query and write access to the remote store. Rows are JSON objects.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, StoreError>;

    /// Insert one row and return it as stored (with generated columns).
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    /// Apply `patch` to every row matching `filters`; returns the updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<Vec<Value>, StoreError>;

    /// Delete every row matching `filters`; returns how many were removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError>;
}

/// Source of push notifications. Opening a channel is synchronous; events
/// arrive on the returned subscription's receiver.
pub trait PushSource: Send + Sync {
    fn subscribe(&self, channel: &str, tables: &[TableFilter]) -> Result<PushSubscription, StoreError>;
}

/// Push source for backends without realtime support. Every subscription
/// attempt fails, which the router logs and otherwise ignores.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPush;

impl PushSource for NoPush {
    fn subscribe(&self, channel: &str, _tables: &[TableFilter]) -> Result<PushSubscription, StoreError> {
        Err(StoreError::PushUnavailable(format!(
            "backend has no realtime support (channel {})",
            channel
        )))
    }
}

pub fn decode_row<T: DeserializeOwned>(table: &str, row: Value) -> Result<T, StoreError> {
    serde_json::from_value(row).map_err(|e| StoreError::decode(table, e))
}

pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter().map(|row| decode_row(table, row)).collect()
}

pub fn encode_row<T: Serialize>(table: &str, row: &T) -> Result<Value, StoreError> {
    serde_json::to_value(row).map_err(|e| StoreError::decode(table, e))
}

/// Run a select and decode every row into `T`.
pub async fn select_as<T: DeserializeOwned>(backend: &dyn Backend, query: &Query) -> Result<Vec<T>, StoreError> {
    let rows = backend.select(query).await?;
    decode_rows(&query.table, rows)
}

/// Run a select expected to yield zero or one row.
pub async fn select_maybe_one<T: DeserializeOwned>(
    backend: &dyn Backend,
    query: &Query,
) -> Result<Option<T>, StoreError> {
    let query = query.clone().limit(1);
    let rows = backend.select(&query).await?;
    if rows.len() > 1 {
        warn!(table = %query.table, count = rows.len(), "Expected at most one row");
    }
    match rows.into_iter().next() {
        Some(row) => Ok(Some(decode_row(&query.table, row)?)),
        None => Ok(None),
    }
}
