//! Raw appearance rows for a year, for the glyph/icon editor.

use async_trait::async_trait;
use tracing::debug;

use super::MARKERS_APPEARANCE;
use crate::backend::{decode_row, select_as, Backend, ChangeEvent, ChangeKind, Query, TableFilter};
use crate::compose::extract_templates;
use crate::error::StoreError;
use crate::models::{GlyphSet, MarkerAppearance};
use crate::sync::{CachePolicy, PatchOutcome, Resource, ResourceKey, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyphs {
    pub year: i32,
}

impl Glyphs {
    pub fn new(year: i32) -> Self {
        Self { year }
    }
}

#[async_trait]
impl Resource for Glyphs {
    type Data = GlyphSet;

    fn key(&self) -> ResourceKey {
        ResourceKey::year(ResourceKind::Glyphs, self.year)
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::RetainUntilEvicted
    }

    fn tables(&self) -> Vec<TableFilter> {
        vec![TableFilter::year(MARKERS_APPEARANCE, self.year)]
    }

    async fn fetch(&self, backend: &dyn Backend) -> Result<Self::Data, StoreError> {
        let query = Query::table(MARKERS_APPEARANCE)
            .eq("event_year", self.year)
            .order("id", true);
        let all: Vec<MarkerAppearance> = select_as(backend, &query).await?;

        let templates = extract_templates(&all);
        let rows: Vec<MarkerAppearance> = all.into_iter().filter(|row| !row.is_template()).collect();
        debug!(year = self.year, count = rows.len(), "Fetched glyph rows");
        Ok(GlyphSet {
            event_year: self.year,
            templates,
            rows,
        })
    }

    /// Updates to an existing per-marker row are applied in place. Template
    /// edits change every marker's fallback and always reload.
    fn patch(&self, current: &Self::Data, event: &ChangeEvent) -> PatchOutcome<Self::Data> {
        if event.event_type != ChangeKind::Update {
            return PatchOutcome::Reload;
        }
        let Some(row) = event.new.clone() else {
            return PatchOutcome::Reload;
        };
        let Ok(updated) = decode_row::<MarkerAppearance>(MARKERS_APPEARANCE, row) else {
            return PatchOutcome::Reload;
        };
        if updated.is_template() || updated.event_year != self.year {
            return PatchOutcome::Reload;
        }
        let Some(index) = current.rows.iter().position(|r| r.id == updated.id) else {
            return PatchOutcome::Reload;
        };
        if current.rows[index] == updated {
            return PatchOutcome::Unchanged;
        }

        let mut next = current.clone();
        next.rows[index] = updated;
        PatchOutcome::Patched(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.seed(
            MARKERS_APPEARANCE,
            vec![
                json!({"id": -2, "event_year": 2026, "glyph": "dot"}),
                json!({"id": -1, "event_year": 2026, "glyph": "star"}),
                json!({"id": 4, "event_year": 2026, "glyph": "cup"}),
                json!({"id": 4, "event_year": 2025, "glyph": "old"}),
            ],
        );
        backend
    }

    #[tokio::test]
    async fn test_templates_split_from_rows() {
        let backend = seeded();
        let set = Glyphs::new(2026).fetch(&backend).await.expect("fetch");
        assert_eq!(set.rows.len(), 1);
        assert_eq!(set.rows[0].style.glyph.as_deref(), Some("cup"));
        assert_eq!(set.templates.assigned.glyph.as_deref(), Some("star"));
        assert_eq!(set.templates.unassigned.glyph.as_deref(), Some("dot"));
    }

    #[tokio::test]
    async fn test_row_update_patches_template_update_reloads() {
        let backend = seeded();
        let glyphs = Glyphs::new(2026);
        let set = glyphs.fetch(&backend).await.expect("fetch");

        let row_event = ChangeEvent::new(
            ChangeKind::Update,
            MARKERS_APPEARANCE,
            Some(json!({"id": 4, "event_year": 2026, "glyph": "beer"})),
            None,
        );
        match glyphs.patch(&set, &row_event) {
            PatchOutcome::Patched(next) => assert_eq!(next.rows[0].style.glyph.as_deref(), Some("beer")),
            other => panic!("expected patch, got {:?}", other),
        }

        let template_event = ChangeEvent::new(
            ChangeKind::Update,
            MARKERS_APPEARANCE,
            Some(json!({"id": -1, "event_year": 2026, "glyph": "moon"})),
            None,
        );
        assert!(matches!(glyphs.patch(&set, &template_event), PatchOutcome::Reload));
    }
}
