//! The company directory. Not year-scoped.

use async_trait::async_trait;
use tracing::debug;

use super::COMPANIES;
use crate::backend::{decode_row, encode_row, select_as, Backend, ChangeEvent, ChangeKind, Filter, Query, TableFilter};
use crate::error::StoreError;
use crate::models::{Company, CompanyDraft};
use crate::mutation::{finish, MutationResult};
use crate::sync::{CachePolicy, CacheRegistry, PatchOutcome, Resource, ResourceKey, ResourceKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Companies;

fn sort_by_name(companies: &mut [Company]) {
    companies.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl Resource for Companies {
    type Data = Vec<Company>;

    fn key(&self) -> ResourceKey {
        ResourceKey::singleton(ResourceKind::Companies)
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::RetainUntilEvicted
    }

    fn tables(&self) -> Vec<TableFilter> {
        vec![TableFilter::all(COMPANIES)]
    }

    async fn fetch(&self, backend: &dyn Backend) -> Result<Self::Data, StoreError> {
        let query = Query::table(COMPANIES).order("name", true).order("id", true);
        let companies: Vec<Company> = select_as(backend, &query).await?;
        debug!(count = companies.len(), "Fetched companies");
        Ok(companies)
    }

    /// An update to a known row is applied in place; inserts and deletes reload.
    fn patch(&self, current: &Self::Data, event: &ChangeEvent) -> PatchOutcome<Self::Data> {
        if event.event_type != ChangeKind::Update {
            return PatchOutcome::Reload;
        }
        let Some(row) = event.new.clone() else {
            return PatchOutcome::Reload;
        };
        let Ok(updated) = decode_row::<Company>(COMPANIES, row) else {
            return PatchOutcome::Reload;
        };
        let Some(index) = current.iter().position(|c| c.id == updated.id) else {
            return PatchOutcome::Reload;
        };
        if current[index] == updated {
            return PatchOutcome::Unchanged;
        }

        let mut next = current.clone();
        next[index] = updated;
        sort_by_name(&mut next);
        PatchOutcome::Patched(next)
    }
}

/// Companies are joined into markers and subscriptions of every year.
fn owners(registry: &CacheRegistry) -> Vec<ResourceKey> {
    let mut keys = vec![ResourceKey::singleton(ResourceKind::Companies)];
    keys.extend(registry.keys_of(ResourceKind::Markers));
    keys.extend(registry.keys_of(ResourceKind::Subscriptions));
    keys
}

/// A name, when given, must not be blank.
fn check_name(draft: &CompanyDraft) -> Result<(), StoreError> {
    match draft.name.as_deref() {
        Some(name) if name.trim().is_empty() => {
            Err(StoreError::InvalidInput("company name must not be blank".to_string()))
        }
        _ => Ok(()),
    }
}

pub async fn create_company(registry: &CacheRegistry, draft: &CompanyDraft) -> MutationResult<Company> {
    let result = async {
        if draft.name.is_none() {
            return Err(StoreError::InvalidInput("company name is required".to_string()));
        }
        check_name(draft)?;
        let row = encode_row(COMPANIES, draft)?;
        let stored = registry.backend().insert(COMPANIES, row).await?;
        decode_row::<Company>(COMPANIES, stored)
    }
    .await;
    finish(registry, "create_company", result, owners(registry)).await
}

pub async fn update_company(registry: &CacheRegistry, id: i64, draft: &CompanyDraft) -> MutationResult<Company> {
    let result = async {
        check_name(draft)?;
        let patch = encode_row(COMPANIES, draft)?;
        let mut rows = registry
            .backend()
            .update(COMPANIES, &[Filter::eq("id", id)], patch)
            .await?;
        match rows.pop() {
            Some(row) => decode_row::<Company>(COMPANIES, row),
            None => Err(StoreError::NotFound(format!("company {}", id))),
        }
    }
    .await;
    finish(registry, "update_company", result, owners(registry)).await
}

pub async fn delete_company(registry: &CacheRegistry, id: i64) -> MutationResult<u64> {
    let result = registry.backend().delete(COMPANIES, &[Filter::eq("id", id)]).await;
    finish(registry, "delete_company", result, owners(registry)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::resources::{test_registry, Subscriptions};
    use serde_json::json;

    fn company(id: i64, name: &str) -> Company {
        Company {
            id,
            name: name.to_string(),
            logo: None,
            website: None,
            info: None,
            contact: None,
            phone: None,
            email: None,
        }
    }

    fn update(row: serde_json::Value) -> ChangeEvent {
        ChangeEvent::new(ChangeKind::Update, COMPANIES, Some(row), None)
    }

    #[test]
    fn test_update_patches_and_resorts() {
        let current = vec![company(1, "Acme"), company(2, "Beta")];
        let event = update(json!({"id": 1, "name": "Zulu"}));
        match Companies.patch(&current, &event) {
            PatchOutcome::Patched(next) => {
                let names: Vec<&str> = next.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["Beta", "Zulu"]);
            }
            other => panic!("expected patch, got {:?}", other),
        }
    }

    #[test]
    fn test_identical_update_is_unchanged() {
        let current = vec![company(1, "Acme")];
        let event = update(json!({"id": 1, "name": "Acme"}));
        assert!(matches!(Companies.patch(&current, &event), PatchOutcome::Unchanged));
    }

    #[test]
    fn test_unknown_row_and_inserts_reload() {
        let current = vec![company(1, "Acme")];
        assert!(matches!(
            Companies.patch(&current, &update(json!({"id": 9, "name": "New"}))),
            PatchOutcome::Reload
        ));
        let insert = ChangeEvent::new(ChangeKind::Insert, COMPANIES, Some(json!({"id": 2, "name": "B"})), None);
        assert!(matches!(Companies.patch(&current, &insert), PatchOutcome::Reload));
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let backend = MemoryBackend::new();
        let registry = test_registry(&backend);
        let result = create_company(&registry, &CompanyDraft::default()).await;
        assert!(result.error.is_some());
        assert!(backend.rows(COMPANIES).is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_blank_name() {
        let backend = MemoryBackend::new();
        backend.seed(COMPANIES, vec![json!({"id": 1, "name": "Acme"})]);
        let registry = test_registry(&backend);

        let result = update_company(&registry, 1, &CompanyDraft::named("   ")).await;
        assert!(result.error.is_some_and(|e| e.contains("blank")));
        assert_eq!(backend.rows(COMPANIES), vec![json!({"id": 1, "name": "Acme"})]);

        let untouched = update_company(
            &registry,
            1,
            &CompanyDraft {
                phone: Some("5551234567".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(untouched.is_ok());
        assert_eq!(untouched.data.map(|c| c.name), Some("Acme".to_string()));
    }

    #[tokio::test]
    async fn test_rename_reloads_joined_resources() {
        let backend = MemoryBackend::new();
        backend.seed(COMPANIES, vec![json!({"id": 1, "name": "Acme"})]);
        backend.seed(
            "event_subscriptions",
            vec![json!({"id": 1, "company_id": 1, "event_year": 2026})],
        );
        let registry = test_registry(&backend);
        let companies = registry.acquire(Companies);
        let subscriptions = registry.acquire(Subscriptions::new(2026));
        companies.settled().await;
        subscriptions.settled().await;

        let renamed = update_company(&registry, 1, &CompanyDraft::named("Acme Corp")).await;
        assert_eq!(renamed.data.map(|c| c.name), Some("Acme Corp".to_string()));

        let subs = subscriptions.settled().await.data.expect("subscriptions");
        assert_eq!(subs[0].company_name.as_deref(), Some("Acme Corp"));
        let list = companies.settled().await.data.expect("companies");
        assert_eq!(list[0].name, "Acme Corp");
    }

    #[tokio::test]
    async fn test_update_missing_company_is_not_found() {
        let backend = MemoryBackend::new();
        let registry = test_registry(&backend);
        let result = update_company(&registry, 3, &CompanyDraft::named("Ghost")).await;
        assert!(result.error.is_some_and(|e| e.contains("not found")));
    }
}
