//! Pre-aggregated totals for one year.

use async_trait::async_trait;

use super::EVENT_TOTALS;
use crate::backend::{select_maybe_one, Backend, Query, TableFilter};
use crate::error::StoreError;
use crate::models::EventTotals;
use crate::sync::{CachePolicy, Resource, ResourceKey, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub year: i32,
}

impl Counts {
    pub fn new(year: i32) -> Self {
        Self { year }
    }
}

#[async_trait]
impl Resource for Counts {
    type Data = EventTotals;

    fn key(&self) -> ResourceKey {
        ResourceKey::year(ResourceKind::Counts, self.year)
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::RefreshOnMount
    }

    fn tables(&self) -> Vec<TableFilter> {
        vec![TableFilter::year(EVENT_TOTALS, self.year)]
    }

    async fn fetch(&self, backend: &dyn Backend) -> Result<Self::Data, StoreError> {
        let query = Query::table(EVENT_TOTALS).eq("event_year", self.year);
        let totals: Option<EventTotals> = select_maybe_one(backend, &query).await?;
        Ok(totals.unwrap_or_else(|| EventTotals::empty(self.year)))
    }
}
