//! The organization profile singleton.

use async_trait::async_trait;

use super::ORGANIZATION_PROFILE;
use crate::backend::{decode_row, encode_row, select_maybe_one, Backend, Filter, Query, TableFilter};
use crate::error::StoreError;
use crate::models::{OrganizationProfile, ProfileDraft};
use crate::mutation::{finish, MutationResult};
use crate::sync::{CachePolicy, CacheRegistry, Resource, ResourceKey, ResourceKind};

/// `None` until someone saves a profile; a missing row is not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Organization;

#[async_trait]
impl Resource for Organization {
    type Data = Option<OrganizationProfile>;

    fn key(&self) -> ResourceKey {
        ResourceKey::singleton(ResourceKind::Organization)
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::RetainUntilEvicted
    }

    fn tables(&self) -> Vec<TableFilter> {
        vec![TableFilter::all(ORGANIZATION_PROFILE)]
    }

    async fn fetch(&self, backend: &dyn Backend) -> Result<Self::Data, StoreError> {
        select_maybe_one(backend, &Query::table(ORGANIZATION_PROFILE).order("id", true)).await
    }
}

/// Update the existing profile row, or create it if there is none.
pub async fn save_organization_profile(
    registry: &CacheRegistry,
    draft: &ProfileDraft,
) -> MutationResult<OrganizationProfile> {
    let result = async {
        let backend = registry.backend();
        let row = encode_row(ORGANIZATION_PROFILE, draft)?;
        let existing: Option<OrganizationProfile> =
            select_maybe_one(backend, &Query::table(ORGANIZATION_PROFILE).order("id", true)).await?;

        match existing {
            Some(profile) => {
                let mut rows = backend
                    .update(ORGANIZATION_PROFILE, &[Filter::eq("id", profile.id)], row)
                    .await?;
                match rows.pop() {
                    Some(row) => decode_row::<OrganizationProfile>(ORGANIZATION_PROFILE, row),
                    None => Err(StoreError::NotFound(format!("organization profile {}", profile.id))),
                }
            }
            None => {
                if draft.name.is_none() {
                    return Err(StoreError::InvalidInput("organization name is required".to_string()));
                }
                let stored = backend.insert(ORGANIZATION_PROFILE, row).await?;
                decode_row::<OrganizationProfile>(ORGANIZATION_PROFILE, stored)
            }
        }
    }
    .await;
    finish(
        registry,
        "save_organization_profile",
        result,
        [ResourceKey::singleton(ResourceKind::Organization)],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::resources::test_registry;

    #[tokio::test]
    async fn test_missing_row_is_none_not_error() {
        let backend = MemoryBackend::new();
        let registry = test_registry(&backend);
        let handle = registry.acquire(Organization);
        let state = handle.settled().await;
        assert!(state.error.is_none());
        assert_eq!(state.data.as_deref(), Some(&None));
    }

    #[tokio::test]
    async fn test_save_inserts_then_updates() {
        let backend = MemoryBackend::new();
        let registry = test_registry(&backend);
        let handle = registry.acquire(Organization);
        handle.settled().await;

        let draft = ProfileDraft {
            name: Some("Harbour Fair".to_string()),
            ..Default::default()
        };
        let saved = save_organization_profile(&registry, &draft).await;
        let id = saved.data.expect("inserted").id;

        let draft = ProfileDraft {
            email: Some("info@harbour.example".to_string()),
            ..Default::default()
        };
        let saved = save_organization_profile(&registry, &draft).await;
        let profile = saved.data.expect("updated");
        assert_eq!(profile.id, id);
        assert_eq!(profile.name, "Harbour Fair");
        assert_eq!(backend.rows(ORGANIZATION_PROFILE).len(), 1);

        let cached = handle.state().data.expect("data");
        assert_eq!(
            (*cached).as_ref().and_then(|p| p.email.as_deref()),
            Some("info@harbour.example")
        );
    }

    #[tokio::test]
    async fn test_first_save_needs_a_name() {
        let backend = MemoryBackend::new();
        backend.seed(ORGANIZATION_PROFILE, vec![]);
        let registry = test_registry(&backend);
        let result = save_organization_profile(&registry, &ProfileDraft::default()).await;
        assert!(result.error.is_some());
        assert!(backend.rows(ORGANIZATION_PROFILE).is_empty());
    }
}
