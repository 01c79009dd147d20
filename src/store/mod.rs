//! Persistence seams. The service only needs key-value semantics from its
//! backing stores, plus one compare-and-swap on credential expiry and an
//! expiring publish claim per draft.

pub mod memory;
pub mod redis_listings;

use crate::models::{Credential, ListingDraft};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::{MemoryCredentialStore, MemoryListingRepository};
pub use redis_listings::RedisListingRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("stored record is unreadable: {0}")]
    Corrupt(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, owner_id: &str) -> Result<Option<Credential>, StoreError>;

    /// Unconditional upsert, used when a fresh authorization lands.
    async fn put(&self, credential: Credential) -> Result<(), StoreError>;

    /// Writes `credential` only if the stored expiry still equals
    /// `expected_expires_at`. Returns whether the write happened.
    async fn replace_if_unchanged(
        &self,
        expected_expires_at: Option<DateTime<Utc>>,
        credential: Credential,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
pub enum MarkPushed {
    Updated(ListingDraft),
    /// Someone already recorded an external id; it is returned untouched.
    AlreadyPushed(ListingDraft),
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn insert(&self, draft: ListingDraft) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<ListingDraft>, StoreError>;

    /// Flips a draft to `pushed` with its external id, at most once.
    async fn mark_pushed(&self, id: &str, external_id: &str) -> Result<MarkPushed, StoreError>;

    /// Takes the publish claim on `id`. Returns false while another attempt,
    /// possibly on another instance, holds it.
    async fn claim_publish(&self, id: &str) -> Result<bool, StoreError>;

    async fn release_publish(&self, id: &str) -> Result<(), StoreError>;
}
