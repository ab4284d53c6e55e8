//! Event subscriptions for one year, joined with company names.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tracing::debug;

use super::{COMPANIES, EVENT_SUBSCRIPTIONS};
use crate::backend::{decode_row, encode_row, select_as, Backend, Filter, Query, TableFilter};
use crate::error::StoreError;
use crate::models::{Company, EventSubscription, SubscriptionDraft, SubscriptionWithCompany};
use crate::mutation::{finish, MutationResult};
use crate::sync::{CachePolicy, CacheRegistry, Resource, ResourceKey, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriptions {
    pub year: i32,
}

impl Subscriptions {
    pub fn new(year: i32) -> Self {
        Self { year }
    }
}

#[async_trait]
impl Resource for Subscriptions {
    type Data = Vec<SubscriptionWithCompany>;

    fn key(&self) -> ResourceKey {
        ResourceKey::year(ResourceKind::Subscriptions, self.year)
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::RefreshOnMount
    }

    fn tables(&self) -> Vec<TableFilter> {
        vec![
            TableFilter::year(EVENT_SUBSCRIPTIONS, self.year),
            TableFilter::all(COMPANIES),
        ]
    }

    async fn fetch(&self, backend: &dyn Backend) -> Result<Self::Data, StoreError> {
        let query = Query::table(EVENT_SUBSCRIPTIONS)
            .eq("event_year", self.year)
            .order("id", true);
        let subscriptions: Vec<EventSubscription> = select_as(backend, &query).await?;

        let company_ids: BTreeSet<i64> = subscriptions.iter().map(|s| s.company_id).collect();
        let names: HashMap<i64, String> = if company_ids.is_empty() {
            HashMap::new()
        } else {
            let query = Query::table(COMPANIES).is_in("id", company_ids);
            let companies: Vec<Company> = select_as(backend, &query).await?;
            companies.into_iter().map(|c| (c.id, c.name)).collect()
        };

        let mut joined: Vec<SubscriptionWithCompany> = subscriptions
            .into_iter()
            .map(|subscription| SubscriptionWithCompany {
                company_name: names.get(&subscription.company_id).cloned(),
                subscription,
            })
            .collect();
        // Listed by company name; subscriptions for deleted companies sort last.
        joined.sort_by(|a, b| match (&a.company_name, &b.company_name) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.subscription.id.cmp(&b.subscription.id),
        });

        debug!(year = self.year, count = joined.len(), "Fetched subscriptions");
        Ok(joined)
    }
}

fn owners(year: i32) -> [ResourceKey; 3] {
    [
        ResourceKey::year(ResourceKind::Subscriptions, year),
        ResourceKey::year(ResourceKind::Markers, year),
        ResourceKey::year(ResourceKind::Counts, year),
    ]
}

/// Register `company_id` for `year`. Other draft fields are optional.
pub async fn create_subscription(
    registry: &CacheRegistry,
    company_id: i64,
    year: i32,
    draft: &SubscriptionDraft,
) -> MutationResult<EventSubscription> {
    let draft = SubscriptionDraft {
        company_id: Some(company_id),
        event_year: Some(year),
        ..draft.clone()
    };
    let result = async {
        let row = encode_row(EVENT_SUBSCRIPTIONS, &draft)?;
        let stored = registry.backend().insert(EVENT_SUBSCRIPTIONS, row).await?;
        decode_row::<EventSubscription>(EVENT_SUBSCRIPTIONS, stored)
    }
    .await;
    finish(registry, "create_subscription", result, owners(year)).await
}

pub async fn update_subscription(
    registry: &CacheRegistry,
    id: i64,
    year: i32,
    draft: &SubscriptionDraft,
) -> MutationResult<EventSubscription> {
    let result = async {
        let patch = encode_row(EVENT_SUBSCRIPTIONS, draft)?;
        let mut rows = registry
            .backend()
            .update(EVENT_SUBSCRIPTIONS, &[Filter::eq("id", id)], patch)
            .await?;
        match rows.pop() {
            Some(row) => decode_row::<EventSubscription>(EVENT_SUBSCRIPTIONS, row),
            None => Err(StoreError::NotFound(format!("subscription {}", id))),
        }
    }
    .await;
    finish(registry, "update_subscription", result, owners(year)).await
}

pub async fn delete_subscription(registry: &CacheRegistry, id: i64, year: i32) -> MutationResult<u64> {
    let result = registry
        .backend()
        .delete(EVENT_SUBSCRIPTIONS, &[Filter::eq("id", id)])
        .await;
    finish(registry, "delete_subscription", result, owners(year)).await
}
