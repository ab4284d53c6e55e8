//! The resource catalogue.
//!
//! Each submodule defines one [`Resource`](crate::sync::Resource) (its
//! key, cache policy, queries and push tables) plus the mutations that
//! write the tables it owns.
//!
//! | resource | key | policy |
//! |---|---|---|
//! | [`Assignments`] | year | refresh-on-mount |
//! | [`Companies`] | singleton | retain-until-evicted |
//! | [`Subscriptions`] | year | refresh-on-mount |
//! | [`Organization`] | singleton | retain-until-evicted |
//! | [`Markers`] | year | retain-until-evicted, snapshot |
//! | [`Glyphs`] | year | retain-until-evicted |
//! | [`Counts`] | year | refresh-on-mount |

pub mod assignments;
pub mod companies;
pub mod counts;
pub mod glyphs;
pub mod markers;
pub mod organization;
pub mod subscriptions;

pub use assignments::Assignments;
pub use companies::Companies;
pub use counts::Counts;
pub use glyphs::Glyphs;
pub use markers::Markers;
pub use organization::Organization;
pub use subscriptions::Subscriptions;

use serde_json::Value;

pub const MARKERS_CORE: &str = "markers_core";
pub const MARKERS_APPEARANCE: &str = "markers_appearance";
pub const MARKERS_CONTENT: &str = "markers_content";
pub const ASSIGNMENTS: &str = "assignments";
pub const COMPANIES: &str = "companies";
pub const EVENT_SUBSCRIPTIONS: &str = "event_subscriptions";
pub const ORGANIZATION_PROFILE: &str = "organization_profile";
pub const EVENT_TOTALS: &str = "event_totals";

fn row_id(row: &Value) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

#[cfg(test)]
pub(crate) fn test_registry(backend: &crate::backend::MemoryBackend) -> crate::sync::CacheRegistry {
    use std::sync::Arc;

    crate::sync::CacheRegistry::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        crate::snapshot::SnapshotStore::in_memory(),
        crate::sync::Connectivity::online(),
        crate::sync::SyncSettings::default(),
    )
}
