use serde::{Deserialize, Serialize};

use super::marker::Logistics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Insert/update payload for `companies`. Unset fields are not sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompanyDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl CompanyDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// A company placed on a marker for one event year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub marker_id: i64,
    pub company_id: i64,
    pub event_year: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentDraft {
    pub marker_id: i64,
    pub company_id: i64,
    pub event_year: i32,
}

/// A company's registration for one event year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSubscription {
    pub id: i64,
    pub company_id: i64,
    pub event_year: i32,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub booth_count: Option<i32>,
    #[serde(default)]
    pub breakfast_sat: Option<i32>,
    #[serde(default)]
    pub lunch_sat: Option<i32>,
    #[serde(default)]
    pub bbq_sat: Option<i32>,
    #[serde(default)]
    pub breakfast_sun: Option<i32>,
    #[serde(default)]
    pub lunch_sun: Option<i32>,
    #[serde(default)]
    pub coins: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<&EventSubscription> for Logistics {
    fn from(sub: &EventSubscription) -> Self {
        Logistics {
            contact: sub.contact.clone(),
            phone: sub.phone.clone(),
            email: sub.email.clone(),
            booth_count: sub.booth_count,
            breakfast_sat: sub.breakfast_sat,
            lunch_sat: sub.lunch_sat,
            bbq_sat: sub.bbq_sat,
            breakfast_sun: sub.breakfast_sun,
            lunch_sun: sub.lunch_sun,
            coins: sub.coins,
            notes: sub.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booth_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakfast_sat: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lunch_sat: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbq_sat: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakfast_sun: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lunch_sun: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coins: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Subscription row joined with its company's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionWithCompany {
    #[serde(flatten)]
    pub subscription: EventSubscription,
    pub company_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_draft_skips_unset_fields() {
        let draft = CompanyDraft::named("Acme");
        let value = serde_json::to_value(&draft).expect("serialize draft");
        assert_eq!(value, serde_json::json!({"name": "Acme"}));
    }

    #[test]
    fn test_logistics_from_subscription() {
        let sub = EventSubscription {
            id: 1,
            company_id: 7,
            event_year: 2026,
            contact: Some("Jo".to_string()),
            booth_count: Some(2),
            coins: Some(10),
            ..Default::default()
        };
        let logistics = Logistics::from(&sub);
        assert_eq!(logistics.contact.as_deref(), Some("Jo"));
        assert_eq!(logistics.booth_count, Some(2));
        assert_eq!(logistics.coins, Some(10));
        assert!(logistics.notes.is_none());
    }
}
