use crate::ebay::EbayClient;
use crate::locks::KeyedLocks;
use crate::models::Credential;
use crate::store::{CredentialStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Tokens are refreshed once fewer than this many seconds of validity remain.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("no marketplace credential for owner `{0}`")]
    NoCredential(String),
    #[error("credential for owner `{0}` has no refresh token")]
    NoRefreshToken(String),
    #[error("token refresh failed: {0}")]
    Refresh(String),
    #[error("credential store unavailable: {0}")]
    Store(#[from] StoreError),
}

pub fn needs_refresh(credential: &Credential, now: DateTime<Utc>) -> bool {
    match credential.expires_at {
        Some(expires_at) => now >= expires_at - Duration::seconds(REFRESH_MARGIN_SECS),
        None => true,
    }
}

/// Hands out valid access tokens per owner. Refreshes are single-flight per
/// owner in-process (keyed mutex) and guarded across processes by a
/// compare-and-swap on the stored expiry.
#[derive(Clone)]
pub struct TokenManager {
    ebay: EbayClient,
    store: Arc<dyn CredentialStore>,
    locks: KeyedLocks,
}

impl TokenManager {
    pub fn new(ebay: EbayClient, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            ebay,
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        self.ebay.authorize_url(state)
    }

    /// Completes the consent flow and stores the first credential for `owner_id`.
    pub async fn complete_authorization(
        &self,
        owner_id: &str,
        code: &str,
    ) -> Result<Credential, AuthenticationError> {
        let grant = self
            .ebay
            .exchange_code(code)
            .await
            .map_err(|err| AuthenticationError::Refresh(err.to_string()))?;
        let credential = Credential {
            owner_id: owner_id.to_string(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: Some(Utc::now() + Duration::seconds(grant.expires_in)),
        };
        self.store.put(credential.clone()).await?;
        info!(target = "snaplist.tokens", owner_id, "marketplace_authorized");
        Ok(credential)
    }

    pub async fn ensure_valid_token(&self, owner_id: &str) -> Result<String, AuthenticationError> {
        let credential = self.load(owner_id).await?;
        if !needs_refresh(&credential, Utc::now()) {
            return Ok(credential.access_token);
        }

        let _guard = self.locks.lock(owner_id).await;
        // Whoever held the lock before us may already have refreshed.
        let credential = self.load(owner_id).await?;
        if !needs_refresh(&credential, Utc::now()) {
            return Ok(credential.access_token);
        }
        self.refresh(credential).await
    }

    async fn load(&self, owner_id: &str) -> Result<Credential, AuthenticationError> {
        let credential = self
            .store
            .get(owner_id)
            .await?
            .ok_or_else(|| AuthenticationError::NoCredential(owner_id.to_string()))?;
        if credential
            .refresh_token
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
        {
            return Err(AuthenticationError::NoRefreshToken(owner_id.to_string()));
        }
        Ok(credential)
    }

    async fn refresh(&self, current: Credential) -> Result<String, AuthenticationError> {
        let owner_id = current.owner_id.clone();
        let refresh_token = current.refresh_token.clone().unwrap_or_default();
        let grant = self
            .ebay
            .refresh_user_token(&refresh_token)
            .await
            .map_err(|err| {
                warn!(target = "snaplist.tokens", owner_id = %owner_id, error = %err, "token_refresh_failed");
                AuthenticationError::Refresh(err.to_string())
            })?;

        let expires_at = Utc::now() + Duration::seconds(grant.expires_in);
        if current.expires_at.is_some_and(|previous| expires_at <= previous) {
            return Err(AuthenticationError::Refresh(format!(
                "refresh returned non-advancing expiry ({}s)",
                grant.expires_in
            )));
        }

        let refreshed = Credential {
            owner_id: owner_id.clone(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(current.refresh_token.clone()),
            expires_at: Some(expires_at),
        };
        let access_token = refreshed.access_token.clone();

        if self
            .store
            .replace_if_unchanged(current.expires_at, refreshed)
            .await?
        {
            info!(target = "snaplist.tokens", owner_id = %owner_id, %expires_at, "token_refreshed");
            return Ok(access_token);
        }

        // Another instance won the swap; its token is at least as new as ours.
        warn!(target = "snaplist.tokens", owner_id = %owner_id, "token_refresh_lost_race");
        let winner = self.load(&owner_id).await?;
        Ok(winner.access_token)
    }
}
