//! Marker composition: joins the raw marker, assignment, company and
//! subscription tables for one year into [`ComposedMarkers`].
//!
//! Everything here is pure. Callers fetch the rows (see
//! `resources::markers`) and hand them over in one [`RawMarkerTables`];
//! a failed query never reaches this module, so a composition is always
//! built from one complete set of rows.

use std::collections::HashMap;

use crate::models::{
    AppearanceStyle, AssignedCompany, Assignment, Company, ComposedMarker, ComposedMarkers, DefaultTemplates,
    DisplayContent, EventSubscription, Logistics, MarkerAppearance, MarkerContent, MarkerCore, MarkerKind,
    ASSIGNED_TEMPLATE_ID, UNASSIGNED_TEMPLATE_ID,
};

/// Rows for one event year, as returned by the backend.
#[derive(Debug, Clone, Default)]
pub struct RawMarkerTables {
    pub event_year: i32,
    pub core: Vec<MarkerCore>,
    pub appearance: Vec<MarkerAppearance>,
    pub content: Vec<MarkerContent>,
    pub assignments: Vec<Assignment>,
    pub companies: Vec<Company>,
    pub subscriptions: Vec<EventSubscription>,
}

/// Pull the two reserved template rows out of the appearance table.
/// A missing template is all-empty.
pub fn extract_templates(rows: &[MarkerAppearance]) -> DefaultTemplates {
    let find = |id: i64| {
        rows.iter()
            .find(|row| row.id == id)
            .map(|row| row.style.clone())
            .unwrap_or_default()
    };
    DefaultTemplates {
        assigned: find(ASSIGNED_TEMPLATE_ID),
        unassigned: find(UNASSIGNED_TEMPLATE_ID),
    }
}

/// Appearance for one marker: its own non-null fields win, the rest come
/// from the template picked by assignment count.
pub fn resolve_appearance(
    own: Option<&AppearanceStyle>,
    templates: &DefaultTemplates,
    assignment_count: usize,
) -> AppearanceStyle {
    let fallback = templates.for_assignment_count(assignment_count);
    match own {
        Some(style) => style.or(&fallback),
        None => fallback,
    }
}

/// Assignments per marker, each list ordered by assignment id so the
/// first element is the earliest insertion.
pub fn group_assignments(assignments: &[Assignment]) -> HashMap<i64, Vec<&Assignment>> {
    let mut by_marker: HashMap<i64, Vec<&Assignment>> = HashMap::new();
    for assignment in assignments {
        by_marker.entry(assignment.marker_id).or_default().push(assignment);
    }
    for list in by_marker.values_mut() {
        list.sort_by_key(|a| a.id);
    }
    by_marker
}

pub fn company_content(company: &Company) -> DisplayContent {
    DisplayContent {
        name: Some(company.name.clone()),
        logo: company.logo.clone(),
        website: company.website.clone(),
        info: company.info.clone(),
    }
}

fn stored_content(content: &MarkerContent) -> DisplayContent {
    DisplayContent {
        name: content.name.clone(),
        logo: content.logo.clone(),
        website: content.website.clone(),
        info: content.info.clone(),
    }
}

/// Build the composed view. One marker per structural row with a positive
/// id, ordered by id.
pub fn compose_markers(raw: &RawMarkerTables) -> ComposedMarkers {
    let templates = extract_templates(&raw.appearance);

    let appearance: HashMap<i64, &AppearanceStyle> = raw
        .appearance
        .iter()
        .filter(|row| !row.is_template())
        .map(|row| (row.id, &row.style))
        .collect();
    let content: HashMap<i64, &MarkerContent> = raw.content.iter().map(|row| (row.id, row)).collect();
    let companies: HashMap<i64, &Company> = raw.companies.iter().map(|c| (c.id, c)).collect();

    // One subscription per company and year; if duplicates slipped in, the lowest id wins.
    let mut subscriptions: HashMap<i64, &EventSubscription> = HashMap::new();
    for sub in raw.subscriptions.iter().filter(|s| s.event_year == raw.event_year) {
        subscriptions
            .entry(sub.company_id)
            .and_modify(|current| {
                if sub.id < current.id {
                    *current = sub;
                }
            })
            .or_insert(sub);
    }

    let assignments = group_assignments(&raw.assignments);

    let mut markers: Vec<ComposedMarker> = raw
        .core
        .iter()
        .filter(|core| core.id > 0)
        .map(|core| {
            let assigned_rows = assignments.get(&core.id).map(Vec::as_slice).unwrap_or(&[]);
            let kind = MarkerKind::from_id(core.id);

            let assigned: Vec<AssignedCompany> = assigned_rows
                .iter()
                .map(|a| AssignedCompany {
                    assignment_id: a.id,
                    company_id: a.company_id,
                    name: companies.get(&a.company_id).map(|c| c.name.clone()),
                })
                .collect();

            let (display, company_id, logistics) = match kind {
                MarkerKind::Booth => match assigned_rows.first() {
                    Some(first) => (
                        companies.get(&first.company_id).map(|c| company_content(c)).unwrap_or_default(),
                        Some(first.company_id),
                        subscriptions.get(&first.company_id).map(|s| Logistics::from(*s)),
                    ),
                    None => (DisplayContent::default(), None, None),
                },
                MarkerKind::Special => (
                    content.get(&core.id).map(|c| stored_content(c)).unwrap_or_default(),
                    None,
                    None,
                ),
            };

            ComposedMarker {
                id: core.id,
                event_year: core.event_year,
                kind,
                lat: core.lat,
                lng: core.lng,
                angle: core.angle,
                min_zoom: core.min_zoom,
                max_zoom: core.max_zoom,
                locked: core.locked.unwrap_or(false),
                appearance: resolve_appearance(appearance.get(&core.id).copied(), &templates, assigned_rows.len()),
                content: display,
                company_id,
                assigned,
                logistics,
            }
        })
        .collect();
    markers.sort_by_key(|m| m.id);

    ComposedMarkers {
        event_year: raw.event_year,
        markers,
        templates,
    }
}

/// Apply a company update to an existing composition.
///
/// Only booth display content sourced from this company and the names in
/// assignment lists change; neither affects which template or which
/// assignment wins. Returns `None` when nothing referenced the company
/// or nothing visible changed.
pub fn apply_company_update(current: &ComposedMarkers, company: &Company) -> Option<ComposedMarkers> {
    let mut next = current.clone();
    let mut changed = false;

    for marker in &mut next.markers {
        if marker.kind == MarkerKind::Booth && marker.company_id == Some(company.id) {
            let content = company_content(company);
            if marker.content != content {
                marker.content = content;
                changed = true;
            }
        }
        for entry in marker.assigned.iter_mut().filter(|a| a.company_id == company.id) {
            if entry.name.as_deref() != Some(company.name.as_str()) {
                entry.name = Some(company.name.clone());
                changed = true;
            }
        }
    }

    changed.then_some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(id: i64) -> MarkerCore {
        MarkerCore {
            id,
            event_year: 2026,
            lat: 51.0,
            lng: 4.0,
            angle: None,
            min_zoom: None,
            max_zoom: None,
            locked: None,
        }
    }

    fn appearance(id: i64, icon: Option<&str>, glyph: Option<&str>) -> MarkerAppearance {
        MarkerAppearance {
            id,
            event_year: 2026,
            style: AppearanceStyle {
                icon_url: icon.map(String::from),
                glyph: glyph.map(String::from),
                ..Default::default()
            },
        }
    }

    fn assignment(id: i64, marker_id: i64, company_id: i64) -> Assignment {
        Assignment {
            id,
            marker_id,
            company_id,
            event_year: 2026,
        }
    }

    fn company(id: i64, name: &str) -> Company {
        Company {
            id,
            name: name.to_string(),
            logo: Some(format!("{}.png", name.to_lowercase())),
            website: None,
            info: None,
            contact: None,
            phone: None,
            email: None,
        }
    }

    fn base_tables() -> RawMarkerTables {
        RawMarkerTables {
            event_year: 2026,
            core: vec![core(-1), core(-2), core(5), core(7), core(1001)],
            appearance: vec![
                appearance(-1, Some("assigned.svg"), None),
                appearance(-2, Some("free.svg"), Some("dot")),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_templates_are_not_emitted_as_markers() {
        let composed = compose_markers(&base_tables());
        let ids: Vec<i64> = composed.markers.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5, 7, 1001]);
        assert_eq!(composed.templates.assigned.icon_url.as_deref(), Some("assigned.svg"));
    }

    #[test]
    fn test_missing_templates_are_empty() {
        let templates = extract_templates(&[appearance(3, Some("x.svg"), None)]);
        assert!(templates.assigned.is_empty());
        assert!(templates.unassigned.is_empty());
    }

    #[test]
    fn test_unassigned_booth_override_wins() {
        let mut raw = base_tables();
        raw.appearance.push(appearance(5, Some("own.svg"), None));
        let composed = compose_markers(&raw);

        let booth = composed.get(5).expect("booth 5");
        assert!(!booth.is_assigned());
        assert_eq!(booth.appearance.icon_url.as_deref(), Some("own.svg"));
        assert_eq!(booth.appearance.glyph.as_deref(), Some("dot"));
    }

    #[test]
    fn test_assignment_switches_template() {
        let mut raw = base_tables();
        raw.assignments.push(assignment(1, 7, 10));
        raw.companies.push(company(10, "Acme"));
        let composed = compose_markers(&raw);

        let assigned = composed.get(7).expect("booth 7");
        assert_eq!(assigned.appearance.icon_url.as_deref(), Some("assigned.svg"));
        // Not set on the assigned template, so it stays unset.
        assert_eq!(assigned.appearance.glyph, None);

        let free = composed.get(5).expect("booth 5");
        assert_eq!(free.appearance.icon_url.as_deref(), Some("free.svg"));
    }

    #[test]
    fn test_override_wins_regardless_of_assignments() {
        let mut raw = base_tables();
        raw.appearance.push(appearance(7, Some("own.svg"), None));
        raw.assignments.push(assignment(1, 7, 10));
        raw.companies.push(company(10, "Acme"));
        let composed = compose_markers(&raw);
        assert_eq!(
            composed.get(7).expect("booth 7").appearance.icon_url.as_deref(),
            Some("own.svg")
        );
    }

    #[test]
    fn test_first_assignment_supplies_content_and_logistics() {
        let mut raw = base_tables();
        raw.assignments = vec![assignment(9, 7, 20), assignment(4, 7, 10)];
        raw.companies = vec![company(10, "Acme"), company(20, "Zeta")];
        raw.subscriptions = vec![
            EventSubscription {
                id: 1,
                company_id: 10,
                event_year: 2026,
                booth_count: Some(2),
                ..Default::default()
            },
            EventSubscription {
                id: 2,
                company_id: 20,
                event_year: 2026,
                booth_count: Some(1),
                ..Default::default()
            },
        ];
        let composed = compose_markers(&raw);

        let booth = composed.get(7).expect("booth 7");
        assert_eq!(booth.display_name(), "Acme");
        assert_eq!(booth.company_id, Some(10));
        assert_eq!(booth.logistics.as_ref().and_then(|l| l.booth_count), Some(2));
        let names: Vec<Option<&str>> = booth.assigned.iter().map(|a| a.name.as_deref()).collect();
        assert_eq!(names, vec![Some("Acme"), Some("Zeta")]);
    }

    #[test]
    fn test_unassigned_booth_has_no_content_or_logistics() {
        let mut raw = base_tables();
        raw.content.push(MarkerContent {
            id: 5,
            event_year: 2026,
            name: Some("Leftover".to_string()),
            logo: None,
            website: None,
            info: None,
        });
        let composed = compose_markers(&raw);
        let booth = composed.get(5).expect("booth 5");
        assert_eq!(booth.content, DisplayContent::default());
        assert!(booth.logistics.is_none());
    }

    #[test]
    fn test_special_marker_uses_content_table() {
        let mut raw = base_tables();
        raw.content.push(MarkerContent {
            id: 1001,
            event_year: 2026,
            name: Some("Main stage".to_string()),
            logo: None,
            website: None,
            info: Some("Concerts".to_string()),
        });
        raw.assignments.push(assignment(1, 1001, 10));
        raw.companies.push(company(10, "Acme"));
        let composed = compose_markers(&raw);

        let stage = composed.get(1001).expect("special marker");
        assert_eq!(stage.kind, MarkerKind::Special);
        assert_eq!(stage.display_name(), "Main stage");
        assert!(stage.logistics.is_none());
        assert!(stage.company_id.is_none());
    }

    #[test]
    fn test_company_update_patches_first_assignment_only() {
        let mut raw = base_tables();
        raw.assignments = vec![assignment(1, 5, 10), assignment(2, 7, 20), assignment(3, 7, 10)];
        raw.companies = vec![company(10, "Acme"), company(20, "Zeta")];
        let composed = compose_markers(&raw);

        let renamed = company(10, "Acme Corp");
        let patched = apply_company_update(&composed, &renamed).expect("patched");
        assert_eq!(patched.get(5).expect("5").display_name(), "Acme Corp");
        // Marker 7 shows Zeta; only its assignment list mentions Acme.
        assert_eq!(patched.get(7).expect("7").display_name(), "Zeta");
        assert_eq!(
            patched.get(7).expect("7").assigned[1].name.as_deref(),
            Some("Acme Corp")
        );

        assert!(apply_company_update(&patched, &renamed).is_none());
    }
}
