use serde::{Deserialize, Serialize};

/// The organizing body's profile. At most one row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Pre-aggregated counts for one event year (`event_totals` view).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTotals {
    pub event_year: i32,
    pub companies: i64,
    pub subscriptions: i64,
    pub assigned_markers: i64,
    pub booths: i64,
    pub breakfast_sat: i64,
    pub lunch_sat: i64,
    pub bbq_sat: i64,
    pub breakfast_sun: i64,
    pub lunch_sun: i64,
    pub coins: i64,
}

impl EventTotals {
    pub fn empty(event_year: i32) -> Self {
        Self {
            event_year,
            ..Default::default()
        }
    }

    pub fn meals(&self) -> i64 {
        self.breakfast_sat + self.lunch_sat + self.bbq_sat + self.breakfast_sun + self.lunch_sun
    }
}
