//! Plain-text rendering of each resource's data.

use boothcache_core::models::{
    Assignment, Company, ComposedMarker, ComposedMarkers, EventTotals, MarkerKind, OrganizationProfile,
    SubscriptionWithCompany,
};

use crate::format::{format_coord, format_count, format_optional, format_phone, truncate_string};

const NAME_WIDTH: usize = 28;

fn marker_row(marker: &ComposedMarker) -> String {
    let name = match marker.kind {
        MarkerKind::Booth if !marker.is_assigned() => "(free)".to_string(),
        _ => truncate_string(marker.display_name(), NAME_WIDTH),
    };
    let extra = if marker.assigned.len() > 1 {
        format!(" +{}", marker.assigned.len() - 1)
    } else {
        String::new()
    };
    let booths = marker
        .logistics
        .as_ref()
        .map(|l| format_count(l.booth_count))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>5}  {:<7}  {:<width$}  {:<21}  {:>6}  {}{}",
        marker.id,
        marker.kind.label(),
        name,
        format_coord(marker.lat, marker.lng),
        booths,
        format_optional(marker.appearance.icon_url.as_deref(), "-"),
        extra,
        width = NAME_WIDTH,
    )
}

pub fn markers(view: &ComposedMarkers) {
    println!(
        "{:>5}  {:<7}  {:<width$}  {:<21}  {:>6}  {}",
        "ID",
        "KIND",
        "NAME",
        "POSITION",
        "BOOTHS",
        "ICON",
        width = NAME_WIDTH,
    );
    for marker in &view.markers {
        println!("{}", marker_row(marker));
    }
    let assigned = view.markers.iter().filter(|m| m.is_assigned()).count();
    println!("{} markers, {} assigned ({})", view.markers.len(), assigned, view.event_year);
}

pub fn companies(list: &[Company]) {
    for company in list {
        println!(
            "{:>5}  {:<width$}  {:<20}  {}",
            company.id,
            truncate_string(&company.name, NAME_WIDTH),
            company.phone.as_deref().map(format_phone).unwrap_or_default(),
            format_optional(company.email.as_deref(), ""),
            width = NAME_WIDTH,
        );
    }
    println!("{} companies", list.len());
}

pub fn assignments(list: &[Assignment]) {
    for assignment in list {
        println!(
            "{:>5}  marker {:>5}  company {:>5}",
            assignment.id, assignment.marker_id, assignment.company_id
        );
    }
    println!("{} assignments", list.len());
}

pub fn subscriptions(list: &[SubscriptionWithCompany]) {
    for row in list {
        let sub = &row.subscription;
        println!(
            "{:>5}  {:<width$}  booths {:>3}  coins {:>4}  {}",
            sub.id,
            truncate_string(row.company_name.as_deref().unwrap_or("(deleted company)"), NAME_WIDTH),
            format_count(sub.booth_count),
            format_count(sub.coins),
            format_optional(sub.contact.as_deref(), ""),
            width = NAME_WIDTH,
        );
    }
    println!("{} subscriptions", list.len());
}

pub fn counts(totals: &EventTotals) {
    println!("Event year        {}", totals.event_year);
    println!("Companies         {}", totals.companies);
    println!("Subscriptions     {}", totals.subscriptions);
    println!("Booths            {}", totals.booths);
    println!("Assigned markers  {}", totals.assigned_markers);
    println!("Meals             {}", totals.meals());
    println!("Coins             {}", totals.coins);
}

pub fn organization(profile: &Option<OrganizationProfile>) {
    match profile {
        Some(profile) => {
            println!("{}", profile.name);
            if let Some(ref website) = profile.website {
                println!("  {}", website);
            }
            if let Some(ref email) = profile.email {
                println!("  {}", email);
            }
            if let Some(ref phone) = profile.phone {
                println!("  {}", format_phone(phone));
            }
        }
        None => println!("No organization profile saved yet"),
    }
}
