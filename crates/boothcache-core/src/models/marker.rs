//! Marker rows and the composed map view.
//!
//! A marker is stored across three tables sharing one id: `markers_core`
//! (position), `markers_appearance` (icon/glyph styling) and
//! `markers_content` (display text). Two reserved negative ids hold the
//! default appearance templates for a year.

use serde::{Deserialize, Serialize};

/// Appearance template applied to markers with at least one assignment.
pub const ASSIGNED_TEMPLATE_ID: i64 = -1;

/// Appearance template applied to markers without assignments.
pub const UNASSIGNED_TEMPLATE_ID: i64 = -2;

/// Ids at or above this value are special markers (stages, entrances, food).
/// Ids in `1..SPECIAL_MARKER_MIN_ID` are booths.
pub const SPECIAL_MARKER_MIN_ID: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Booth,
    Special,
}

impl MarkerKind {
    pub fn from_id(id: i64) -> Self {
        if id >= SPECIAL_MARKER_MIN_ID {
            MarkerKind::Special
        } else {
            MarkerKind::Booth
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarkerKind::Booth => "booth",
            MarkerKind::Special => "special",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerCore {
    pub id: i64,
    pub event_year: i32,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default)]
    pub min_zoom: Option<f64>,
    #[serde(default)]
    pub max_zoom: Option<f64>,
    #[serde(default)]
    pub locked: Option<bool>,
}

/// Styling columns shared by per-marker appearance rows and templates.
/// `None` means "not overridden".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppearanceStyle {
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub icon_size: Option<[f64; 2]>,
    #[serde(default)]
    pub icon_color: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub glyph: Option<String>,
    #[serde(default)]
    pub glyph_color: Option<String>,
    #[serde(default)]
    pub glyph_size: Option<String>,
    #[serde(default)]
    pub glyph_anchor: Option<[f64; 2]>,
}

impl AppearanceStyle {
    /// Field-wise fallback: keep every value set on `self`, take the rest from `fallback`.
    pub fn or(&self, fallback: &AppearanceStyle) -> AppearanceStyle {
        AppearanceStyle {
            icon_url: self.icon_url.clone().or_else(|| fallback.icon_url.clone()),
            icon_size: self.icon_size.or(fallback.icon_size),
            icon_color: self.icon_color.clone().or_else(|| fallback.icon_color.clone()),
            class_name: self.class_name.clone().or_else(|| fallback.class_name.clone()),
            prefix: self.prefix.clone().or_else(|| fallback.prefix.clone()),
            glyph: self.glyph.clone().or_else(|| fallback.glyph.clone()),
            glyph_color: self.glyph_color.clone().or_else(|| fallback.glyph_color.clone()),
            glyph_size: self.glyph_size.clone().or_else(|| fallback.glyph_size.clone()),
            glyph_anchor: self.glyph_anchor.or(fallback.glyph_anchor),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == AppearanceStyle::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerAppearance {
    pub id: i64,
    pub event_year: i32,
    #[serde(flatten)]
    pub style: AppearanceStyle,
}

impl MarkerAppearance {
    pub fn is_template(&self) -> bool {
        self.id == ASSIGNED_TEMPLATE_ID || self.id == UNASSIGNED_TEMPLATE_ID
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerContent {
    pub id: i64,
    pub event_year: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

/// The two default appearance templates for one year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultTemplates {
    pub assigned: AppearanceStyle,
    pub unassigned: AppearanceStyle,
}

impl DefaultTemplates {
    /// Fallback style for a marker, picked by whether it has any assignment.
    /// The two templates never mix: a field the selected one leaves unset
    /// stays unset.
    pub fn for_assignment_count(&self, count: usize) -> AppearanceStyle {
        if count > 0 {
            self.assigned.clone()
        } else {
            self.unassigned.clone()
        }
    }
}

/// Name/logo/website/info shown on a marker popup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayContent {
    pub name: Option<String>,
    pub logo: Option<String>,
    pub website: Option<String>,
    pub info: Option<String>,
}

/// Admin-only details copied from the exhibiting company's subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Logistics {
    pub contact: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub booth_count: Option<i32>,
    pub breakfast_sat: Option<i32>,
    pub lunch_sat: Option<i32>,
    pub bbq_sat: Option<i32>,
    pub breakfast_sun: Option<i32>,
    pub lunch_sun: Option<i32>,
    pub coins: Option<i32>,
    pub notes: Option<String>,
}

impl Logistics {
    pub fn meal_total(&self) -> i32 {
        [
            self.breakfast_sat,
            self.lunch_sat,
            self.bbq_sat,
            self.breakfast_sun,
            self.lunch_sun,
        ]
        .iter()
        .flatten()
        .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedCompany {
    pub assignment_id: i64,
    pub company_id: i64,
    pub name: Option<String>,
}

/// One marker as the map and admin tables see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedMarker {
    pub id: i64,
    pub event_year: i32,
    pub kind: MarkerKind,
    pub lat: f64,
    pub lng: f64,
    pub angle: Option<f64>,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
    pub locked: bool,
    pub appearance: AppearanceStyle,
    pub content: DisplayContent,
    /// Company supplying `content`, i.e. the first assignment's company.
    pub company_id: Option<i64>,
    pub assigned: Vec<AssignedCompany>,
    pub logistics: Option<Logistics>,
}

impl ComposedMarker {
    pub fn is_assigned(&self) -> bool {
        !self.assigned.is_empty()
    }

    pub fn display_name(&self) -> &str {
        self.content.name.as_deref().unwrap_or("")
    }
}

/// Composed markers for a year plus the templates used to build them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposedMarkers {
    pub event_year: i32,
    pub markers: Vec<ComposedMarker>,
    pub templates: DefaultTemplates,
}

impl ComposedMarkers {
    pub fn get(&self, id: i64) -> Option<&ComposedMarker> {
        self.markers.iter().find(|m| m.id == id)
    }
}

/// Raw per-marker glyph/appearance rows for a year, templates split out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlyphSet {
    pub event_year: i32,
    pub templates: DefaultTemplates,
    pub rows: Vec<MarkerAppearance>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(icon: Option<&str>, glyph: Option<&str>) -> AppearanceStyle {
        AppearanceStyle {
            icon_url: icon.map(String::from),
            glyph: glyph.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_marker_kind_from_id() {
        assert_eq!(MarkerKind::from_id(1), MarkerKind::Booth);
        assert_eq!(MarkerKind::from_id(999), MarkerKind::Booth);
        assert_eq!(MarkerKind::from_id(1000), MarkerKind::Special);
    }

    #[test]
    fn test_style_or_keeps_own_values() {
        let own = style(Some("own.svg"), None);
        let fallback = style(Some("tpl.svg"), Some("star"));
        let merged = own.or(&fallback);
        assert_eq!(merged.icon_url.as_deref(), Some("own.svg"));
        assert_eq!(merged.glyph.as_deref(), Some("star"));
    }

    #[test]
    fn test_templates_assigned_does_not_borrow_unassigned_fields() {
        let templates = DefaultTemplates {
            assigned: style(Some("assigned.svg"), None),
            unassigned: style(Some("free.svg"), Some("dot")),
        };
        let assigned = templates.for_assignment_count(2);
        assert_eq!(assigned.icon_url.as_deref(), Some("assigned.svg"));
        assert_eq!(assigned.glyph, None);

        let free = templates.for_assignment_count(0);
        assert_eq!(free.icon_url.as_deref(), Some("free.svg"));
    }

    #[test]
    fn test_appearance_row_flattens_style() {
        let json = r#"{"id": 5, "event_year": 2026, "icon_url": "x.svg", "glyph_size": "13px"}"#;
        let row: MarkerAppearance = serde_json::from_str(json).expect("parse appearance");
        assert_eq!(row.style.icon_url.as_deref(), Some("x.svg"));
        assert_eq!(row.style.glyph_size.as_deref(), Some("13px"));
        assert!(row.style.icon_color.is_none());
        assert!(!row.is_template());
    }

    #[test]
    fn test_meal_total_ignores_missing() {
        let logistics = Logistics {
            breakfast_sat: Some(2),
            bbq_sat: Some(3),
            ..Default::default()
        };
        assert_eq!(logistics.meal_total(), 5);
    }
}
