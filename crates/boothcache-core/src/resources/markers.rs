//! Composed booth and special markers for one year.
//!
//! The richest resource: six tables feed one view (see [`crate::compose`]).
//! The four marker-side tables are read in parallel; companies and
//! subscriptions follow once the assigned company ids are known. Any
//! failing query fails the whole load and the previous view stays.
//!
//! Snapshots are written after every successful load under
//! `markers_<year>` and served when mounting offline.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{row_id, ASSIGNMENTS, COMPANIES, EVENT_SUBSCRIPTIONS, MARKERS_APPEARANCE, MARKERS_CONTENT, MARKERS_CORE};
use crate::backend::{decode_row, encode_row, select_as, Backend, ChangeEvent, ChangeKind, Filter, Query, TableFilter};
use crate::compose::{apply_company_update, compose_markers, RawMarkerTables};
use crate::error::StoreError;
use crate::models::{
    AppearanceStyle, Assignment, Company, ComposedMarkers, DisplayContent, EventSubscription, MarkerAppearance,
    MarkerContent, MarkerCore, SPECIAL_MARKER_MIN_ID,
};
use crate::mutation::{finish, MutationResult};
use crate::sync::{CachePolicy, CacheRegistry, PatchOutcome, Resource, ResourceKey, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub year: i32,
}

impl Markers {
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    fn year_query(&self, table: &str) -> Query {
        Query::table(table).eq("event_year", self.year).order("id", true)
    }

    /// Read every table the composition needs.
    pub async fn fetch_raw(&self, backend: &dyn Backend) -> Result<RawMarkerTables, StoreError> {
        let assignments_query = Query::table(ASSIGNMENTS)
            .eq("event_year", self.year)
            .order("marker_id", true)
            .order("id", true);

        let core_query = self.year_query(MARKERS_CORE);
        let appearance_query = self.year_query(MARKERS_APPEARANCE);
        let content_query = self.year_query(MARKERS_CONTENT);

        let (core, appearance, content, assignments) = futures::try_join!(
            select_as::<MarkerCore>(backend, &core_query),
            select_as::<MarkerAppearance>(backend, &appearance_query),
            select_as::<MarkerContent>(backend, &content_query),
            select_as::<Assignment>(backend, &assignments_query),
        )?;

        let company_ids: BTreeSet<i64> = assignments.iter().map(|a| a.company_id).collect();
        let (companies, subscriptions) = if company_ids.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let companies_query = Query::table(COMPANIES).is_in("id", company_ids.iter().copied());
            let subscriptions_query = Query::table(EVENT_SUBSCRIPTIONS)
                .eq("event_year", self.year)
                .is_in("company_id", company_ids.iter().copied())
                .order("id", true);
            futures::try_join!(
                select_as::<Company>(backend, &companies_query),
                select_as::<EventSubscription>(backend, &subscriptions_query),
            )?
        };

        Ok(RawMarkerTables {
            event_year: self.year,
            core,
            appearance,
            content,
            assignments,
            companies,
            subscriptions,
        })
    }
}

#[async_trait]
impl Resource for Markers {
    type Data = ComposedMarkers;

    fn key(&self) -> ResourceKey {
        ResourceKey::year(ResourceKind::Markers, self.year)
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::RetainUntilEvicted
    }

    fn tables(&self) -> Vec<TableFilter> {
        vec![
            TableFilter::year(MARKERS_CORE, self.year),
            TableFilter::year(MARKERS_APPEARANCE, self.year),
            TableFilter::year(MARKERS_CONTENT, self.year),
            TableFilter::year(ASSIGNMENTS, self.year),
            TableFilter::all(COMPANIES),
            TableFilter::year(EVENT_SUBSCRIPTIONS, self.year),
        ]
    }

    async fn fetch(&self, backend: &dyn Backend) -> Result<Self::Data, StoreError> {
        let raw = self.fetch_raw(backend).await?;
        let composed = compose_markers(&raw);
        debug!(year = self.year, markers = composed.markers.len(), "Composed markers");
        Ok(composed)
    }

    fn snapshot_name(&self) -> Option<String> {
        Some(format!("markers_{}", self.year))
    }

    /// A company update only rewrites display content of booths it
    /// supplies and names in assignment lists. Everything else reloads.
    fn patch(&self, current: &Self::Data, event: &ChangeEvent) -> PatchOutcome<Self::Data> {
        if event.table != COMPANIES || event.event_type != ChangeKind::Update {
            return PatchOutcome::Reload;
        }
        let Some(row) = event.new.clone() else {
            return PatchOutcome::Reload;
        };
        let Ok(company) = decode_row::<Company>(COMPANIES, row) else {
            return PatchOutcome::Reload;
        };
        match apply_company_update(current, &company) {
            Some(next) => PatchOutcome::Patched(next),
            None => PatchOutcome::Unchanged,
        }
    }
}

fn owners(year: i32) -> [ResourceKey; 4] {
    [
        ResourceKey::year(ResourceKind::Markers, year),
        ResourceKey::year(ResourceKind::Glyphs, year),
        ResourceKey::year(ResourceKind::Assignments, year),
        ResourceKey::year(ResourceKind::Counts, year),
    ]
}

fn marker_filters(year: i32, id: i64) -> [Filter; 2] {
    [Filter::eq("id", id), Filter::eq("event_year", year)]
}

/// One past the highest booth id in use for the year (1 when there are none).
/// Gaps left by deleted booths are not reused.
async fn next_booth_id(backend: &dyn Backend, year: i32) -> Result<i64, StoreError> {
    let rows = backend
        .select(&Query::table(MARKERS_CORE).eq("event_year", year))
        .await?;
    let next = rows
        .iter()
        .filter_map(row_id)
        .filter(|id| (1..SPECIAL_MARKER_MIN_ID).contains(id))
        .max()
        .map_or(1, |max| max + 1);
    if next >= SPECIAL_MARKER_MIN_ID {
        return Err(StoreError::InvalidInput(format!("no free booth id left for {}", year)));
    }
    Ok(next)
}

/// Create a marker's core, appearance and content rows under one id.
/// Without an explicit id the next free booth id is used; pass an id of
/// at least 1000 for a special marker.
pub async fn create_marker(
    registry: &CacheRegistry,
    year: i32,
    id: Option<i64>,
    lat: f64,
    lng: f64,
) -> MutationResult<MarkerCore> {
    let result = async {
        let backend = registry.backend();
        let id = match id {
            Some(id) if id <= 0 => {
                return Err(StoreError::InvalidInput(format!("marker id {} is reserved", id)));
            }
            Some(id) => id,
            None => next_booth_id(backend, year).await?,
        };

        let core = backend
            .insert(MARKERS_CORE, json!({"id": id, "event_year": year, "lat": lat, "lng": lng}))
            .await?;
        backend
            .insert(MARKERS_APPEARANCE, json!({"id": id, "event_year": year}))
            .await?;
        backend
            .insert(MARKERS_CONTENT, json!({"id": id, "event_year": year}))
            .await?;
        decode_row::<MarkerCore>(MARKERS_CORE, core)
    }
    .await;
    finish(registry, "create_marker", result, owners(year)).await
}

pub async fn move_marker(registry: &CacheRegistry, year: i32, id: i64, lat: f64, lng: f64) -> MutationResult<MarkerCore> {
    let result = async {
        let mut rows = registry
            .backend()
            .update(MARKERS_CORE, &marker_filters(year, id), json!({"lat": lat, "lng": lng}))
            .await?;
        match rows.pop() {
            Some(row) => decode_row::<MarkerCore>(MARKERS_CORE, row),
            None => Err(StoreError::NotFound(format!("marker {} ({})", id, year))),
        }
    }
    .await;
    finish(registry, "move_marker", result, owners(year)).await
}

/// Replace a marker's appearance overrides. `None` fields clear the
/// override so the template applies again. Ids -1 and -2 edit the templates.
pub async fn update_marker_appearance(
    registry: &CacheRegistry,
    year: i32,
    id: i64,
    style: &AppearanceStyle,
) -> MutationResult<MarkerAppearance> {
    let result = async {
        let patch = encode_row(MARKERS_APPEARANCE, style)?;
        let mut rows = registry
            .backend()
            .update(MARKERS_APPEARANCE, &marker_filters(year, id), patch)
            .await?;
        match rows.pop() {
            Some(row) => decode_row::<MarkerAppearance>(MARKERS_APPEARANCE, row),
            None => Err(StoreError::NotFound(format!("appearance {} ({})", id, year))),
        }
    }
    .await;
    finish(registry, "update_marker_appearance", result, owners(year)).await
}

/// Set the stored content of a marker. Only special markers display it;
/// booths show their first assigned company instead.
pub async fn update_marker_content(
    registry: &CacheRegistry,
    year: i32,
    id: i64,
    content: &DisplayContent,
) -> MutationResult<MarkerContent> {
    let result = async {
        let patch = encode_row(MARKERS_CONTENT, content)?;
        let mut rows = registry
            .backend()
            .update(MARKERS_CONTENT, &marker_filters(year, id), patch)
            .await?;
        match rows.pop() {
            Some(row) => decode_row::<MarkerContent>(MARKERS_CONTENT, row),
            None => Err(StoreError::NotFound(format!("content {} ({})", id, year))),
        }
    }
    .await;
    finish(registry, "update_marker_content", result, owners(year)).await
}

/// Delete a marker's three rows and its assignments. Returns the number
/// of rows removed across all tables.
pub async fn delete_marker(registry: &CacheRegistry, year: i32, id: i64) -> MutationResult<u64> {
    let result = async {
        if id <= 0 {
            return Err(StoreError::InvalidInput(format!("template {} cannot be deleted", id)));
        }
        let backend = registry.backend();
        let assignment_filters = [Filter::eq("marker_id", id), Filter::eq("event_year", year)];
        let mut removed = backend.delete(ASSIGNMENTS, &assignment_filters).await?;
        for table in [MARKERS_APPEARANCE, MARKERS_CONTENT, MARKERS_CORE] {
            removed += backend.delete(table, &marker_filters(year, id)).await?;
        }
        if removed == 0 {
            return Err(StoreError::NotFound(format!("marker {} ({})", id, year)));
        }
        Ok(removed)
    }
    .await;
    finish(registry, "delete_marker", result, owners(year)).await
}
