//! Company-to-marker assignments for one year.

use async_trait::async_trait;
use tracing::debug;

use super::{row_id, ASSIGNMENTS, MARKERS_CORE};
use crate::backend::{decode_row, encode_row, select_as, Backend, Filter, Query, TableFilter};
use crate::error::StoreError;
use crate::models::{Assignment, AssignmentDraft};
use crate::mutation::{finish, MutationResult};
use crate::sync::{CachePolicy, CacheRegistry, Resource, ResourceKey, ResourceKind};

/// Assignments whose marker exists in `markers_core` for the year,
/// ordered by marker then insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignments {
    pub year: i32,
}

impl Assignments {
    pub fn new(year: i32) -> Self {
        Self { year }
    }
}

#[async_trait]
impl Resource for Assignments {
    type Data = Vec<Assignment>;

    fn key(&self) -> ResourceKey {
        ResourceKey::year(ResourceKind::Assignments, self.year)
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::RefreshOnMount
    }

    fn tables(&self) -> Vec<TableFilter> {
        vec![
            TableFilter::year(ASSIGNMENTS, self.year),
            TableFilter::year(MARKERS_CORE, self.year),
        ]
    }

    async fn fetch(&self, backend: &dyn Backend) -> Result<Self::Data, StoreError> {
        let markers = backend
            .select(&Query::table(MARKERS_CORE).eq("event_year", self.year))
            .await?;
        let marker_ids: Vec<i64> = markers.iter().filter_map(row_id).filter(|id| *id > 0).collect();

        let query = Query::table(ASSIGNMENTS)
            .eq("event_year", self.year)
            .is_in("marker_id", marker_ids)
            .order("marker_id", true)
            .order("id", true);
        let assignments: Vec<Assignment> = select_as(backend, &query).await?;

        debug!(year = self.year, count = assignments.len(), "Fetched assignments");
        Ok(assignments)
    }
}

fn owners(year: i32) -> [ResourceKey; 3] {
    [
        ResourceKey::year(ResourceKind::Assignments, year),
        ResourceKey::year(ResourceKind::Markers, year),
        ResourceKey::year(ResourceKind::Counts, year),
    ]
}

/// Place a company on a marker for `year`.
pub async fn assign_company(
    registry: &CacheRegistry,
    marker_id: i64,
    company_id: i64,
    year: i32,
) -> MutationResult<Assignment> {
    let draft = AssignmentDraft {
        marker_id,
        company_id,
        event_year: year,
    };
    let result = async {
        let row = encode_row(ASSIGNMENTS, &draft)?;
        let stored = registry.backend().insert(ASSIGNMENTS, row).await?;
        decode_row::<Assignment>(ASSIGNMENTS, stored)
    }
    .await;
    finish(registry, "assign_company", result, owners(year)).await
}

/// Remove one assignment. Returns the number of rows removed.
pub async fn unassign(registry: &CacheRegistry, assignment_id: i64, year: i32) -> MutationResult<u64> {
    let result = registry
        .backend()
        .delete(ASSIGNMENTS, &[Filter::eq("id", assignment_id)])
        .await;
    finish(registry, "unassign", result, owners(year)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::resources::test_registry;
    use serde_json::json;

    fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.seed(
            MARKERS_CORE,
            vec![
                json!({"id": -1, "event_year": 2026, "lat": 0.0, "lng": 0.0}),
                json!({"id": 5, "event_year": 2026, "lat": 1.0, "lng": 1.0}),
                json!({"id": 6, "event_year": 2026, "lat": 1.0, "lng": 2.0}),
                json!({"id": 9, "event_year": 2025, "lat": 1.0, "lng": 2.0}),
            ],
        );
        backend.seed(
            ASSIGNMENTS,
            vec![
                json!({"id": 3, "marker_id": 6, "company_id": 1, "event_year": 2026}),
                json!({"id": 2, "marker_id": 5, "company_id": 2, "event_year": 2026}),
                json!({"id": 1, "marker_id": 5, "company_id": 1, "event_year": 2026}),
                // Marker 42 no longer exists.
                json!({"id": 4, "marker_id": 42, "company_id": 1, "event_year": 2026}),
            ],
        );
        backend
    }

    #[tokio::test]
    async fn test_fetch_orders_by_marker_then_id_and_drops_orphans() {
        let backend = seeded();
        let assignments = Assignments::new(2026).fetch(&backend).await.expect("fetch");
        let ids: Vec<i64> = assignments.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(backend.select_log(), vec![MARKERS_CORE.to_string(), ASSIGNMENTS.to_string()]);
    }

    #[tokio::test]
    async fn test_assign_then_unassign_reloads_entry() {
        let backend = seeded();
        let registry = test_registry(&backend);
        let handle = registry.acquire(Assignments::new(2026));
        handle.settled().await;

        let created = assign_company(&registry, 6, 7, 2026).await;
        assert!(created.is_ok());
        let assignment = created.data.expect("created row");
        assert_eq!(assignment.company_id, 7);
        let state = handle.settled().await;
        assert!(state.data.expect("data").iter().any(|a| a.id == assignment.id));

        let removed = unassign(&registry, assignment.id, 2026).await;
        assert_eq!(removed.data, Some(1));
        let state = handle.settled().await;
        assert!(!state.data.expect("data").iter().any(|a| a.id == assignment.id));
    }

    #[tokio::test]
    async fn test_failed_assign_leaves_cache_untouched() {
        let backend = seeded();
        let registry = test_registry(&backend);
        let handle = registry.acquire(Assignments::new(2026));
        let before = handle.settled().await;

        backend.fail_table(ASSIGNMENTS);
        let result = assign_company(&registry, 6, 7, 2026).await;
        assert!(result.data.is_none());
        assert!(result.error.is_some());

        let after = handle.state();
        assert_eq!(after.version, before.version);
        assert!(after.error.is_none());
    }
}
