use super::{CredentialStore, ListingRepository, MarkPushed, StoreError};
use crate::models::{Credential, ListingDraft, ListingStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    records: Arc<Mutex<HashMap<String, Credential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, owner_id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.records.lock().await.get(owner_id).cloned())
    }

    async fn put(&self, credential: Credential) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(credential.owner_id.clone(), credential);
        Ok(())
    }

    async fn replace_if_unchanged(
        &self,
        expected_expires_at: Option<DateTime<Utc>>,
        credential: Credential,
    ) -> Result<bool, StoreError> {
        let mut guard = self.records.lock().await;
        match guard.get(&credential.owner_id) {
            Some(current) if current.expires_at == expected_expires_at => {
                guard.insert(credential.owner_id.clone(), credential);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryListingRepository {
    drafts: Arc<Mutex<HashMap<String, ListingDraft>>>,
    claims: Arc<Mutex<HashSet<String>>>,
}

impl MemoryListingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListingRepository for MemoryListingRepository {
    async fn insert(&self, draft: ListingDraft) -> Result<(), StoreError> {
        self.drafts.lock().await.insert(draft.id.clone(), draft);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ListingDraft>, StoreError> {
        Ok(self.drafts.lock().await.get(id).cloned())
    }

    async fn mark_pushed(&self, id: &str, external_id: &str) -> Result<MarkPushed, StoreError> {
        let mut guard = self.drafts.lock().await;
        let draft = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if draft.status == ListingStatus::Pushed {
            return Ok(MarkPushed::AlreadyPushed(draft.clone()));
        }
        draft.status = ListingStatus::Pushed;
        draft.external_id = Some(external_id.to_string());
        draft.updated_at = Utc::now();
        Ok(MarkPushed::Updated(draft.clone()))
    }

    async fn claim_publish(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.claims.lock().await.insert(id.to_string()))
    }

    async fn release_publish(&self, id: &str) -> Result<(), StoreError> {
        self.claims.lock().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(expires_at: Option<DateTime<Utc>>, token: &str) -> Credential {
        Credential {
            owner_id: "owner-1".into(),
            access_token: token.into(),
            refresh_token: Some("rt".into()),
            expires_at,
        }
    }

    #[tokio::test]
    async fn cas_rejects_stale_expectation() {
        let store = MemoryCredentialStore::new();
        let first = Utc::now();
        store.put(credential(Some(first), "a")).await.unwrap();

        let second = first + Duration::hours(2);
        assert!(
            store
                .replace_if_unchanged(Some(first), credential(Some(second), "b"))
                .await
                .unwrap()
        );
        assert!(
            !store
                .replace_if_unchanged(Some(first), credential(Some(second), "c"))
                .await
                .unwrap()
        );
        let stored = store.get("owner-1").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "b");
    }

    #[tokio::test]
    async fn cas_on_missing_record_is_refused() {
        let store = MemoryCredentialStore::new();
        assert!(
            !store
                .replace_if_unchanged(None, credential(None, "x"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn publish_claim_is_exclusive_until_released() {
        let repo = MemoryListingRepository::new();
        assert!(repo.claim_publish("listing-1").await.unwrap());
        assert!(!repo.claim_publish("listing-1").await.unwrap());
        assert!(repo.claim_publish("listing-2").await.unwrap());

        repo.release_publish("listing-1").await.unwrap();
        assert!(repo.claim_publish("listing-1").await.unwrap());
    }
}
