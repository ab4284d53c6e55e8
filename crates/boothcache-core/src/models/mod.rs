//! Data models for event administration entities.
//!
//! This module contains the row types read from the backend and the
//! composed view types built from them:
//!
//! - `MarkerCore`, `MarkerAppearance`, `MarkerContent`: the three marker tables
//! - `Company`, `Assignment`, `EventSubscription`: who exhibits where, per year
//! - `OrganizationProfile`, `EventTotals`: singleton profile and aggregate counts
//! - `ComposedMarker`, `ComposedMarkers`: the denormalized map view

pub mod company;
pub mod marker;
pub mod organization;

pub use company::{
    Assignment, AssignmentDraft, Company, CompanyDraft, EventSubscription, SubscriptionDraft,
    SubscriptionWithCompany,
};
pub use marker::{
    AppearanceStyle, AssignedCompany, ComposedMarker, ComposedMarkers, DefaultTemplates,
    DisplayContent, GlyphSet, Logistics, MarkerAppearance, MarkerContent, MarkerCore, MarkerKind,
    ASSIGNED_TEMPLATE_ID, SPECIAL_MARKER_MIN_ID, UNASSIGNED_TEMPLATE_ID,
};
pub use organization::{EventTotals, OrganizationProfile, ProfileDraft};
