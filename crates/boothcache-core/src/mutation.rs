use std::fmt;

use tracing::warn;

use crate::error::StoreError;
use crate::sync::{CacheRegistry, ResourceKey};

/// Outcome of a write, shaped for inline feedback: exactly one of `data`
/// and `error` is set. Mutations never panic and never return `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> MutationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            data: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MutationResult<U> {
        MutationResult {
            data: self.data.map(f),
            error: self.error,
        }
    }
}

/// Turn a write result into a [`MutationResult`]. On success every listed
/// key that has a cache entry is force-reloaded before returning; on
/// failure the cache is left untouched.
pub(crate) async fn finish<T>(
    registry: &CacheRegistry,
    action: &str,
    result: Result<T, StoreError>,
    owners: impl IntoIterator<Item = ResourceKey>,
) -> MutationResult<T> {
    match result {
        Ok(data) => {
            registry.reload_keys(owners).await;
            MutationResult::ok(data)
        }
        Err(e) => {
            warn!(action = action, error = %e, "Mutation failed");
            MutationResult::failed(e)
        }
    }
}
