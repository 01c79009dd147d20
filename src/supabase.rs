use crate::http::build_client;
use crate::models::Credential;
use crate::store::{CredentialStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

const TABLE: &str = "ebay_credentials";

/// Credentials kept in a PostgREST table:
/// `ebay_credentials(owner_id text primary key, access_token text,
/// refresh_token text null, expires_at timestamptz null)`.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    http: Client,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            http: build_client(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .ok()?;
        Some(Self::new(&base_url, &service_key))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{TABLE}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }
}

fn expiry_filter(expires_at: Option<DateTime<Utc>>) -> String {
    match expires_at {
        Some(ts) => format!("eq.{}", ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
        None => "is.null".to_string(),
    }
}

async fn rows(response: reqwest::Response) -> Result<Vec<Credential>, StoreError> {
    if !response.status().is_success() {
        return Err(StoreError::Request(format!(
            "HTTP {}",
            response.status()
        )));
    }
    let payload: Value = response
        .json()
        .await
        .map_err(|err| StoreError::Corrupt(err.to_string()))?;
    serde_json::from_value(payload).map_err(|err| StoreError::Corrupt(err.to_string()))
}

#[async_trait]
impl CredentialStore for SupabaseClient {
    async fn get(&self, owner_id: &str) -> Result<Option<Credential>, StoreError> {
        let owner_filter = format!("eq.{owner_id}");
        let response = self
            .authed(self.http.get(self.table_url()))
            .query(&[
                ("owner_id", owner_filter.as_str()),
                ("select", "*"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        Ok(rows(response).await?.pop())
    }

    async fn put(&self, credential: Credential) -> Result<(), StoreError> {
        let response = self
            .authed(self.http.post(self.table_url()))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&credential)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn replace_if_unchanged(
        &self,
        expected_expires_at: Option<DateTime<Utc>>,
        credential: Credential,
    ) -> Result<bool, StoreError> {
        let owner_filter = format!("eq.{}", credential.owner_id);
        let expiry = expiry_filter(expected_expires_at);
        let response = self
            .authed(self.http.patch(self.table_url()))
            .query(&[
                ("owner_id", owner_filter.as_str()),
                ("expires_at", expiry.as_str()),
            ])
            .header("Prefer", "return=representation")
            .json(&credential)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        Ok(!rows(response).await?.is_empty())
    }
}
