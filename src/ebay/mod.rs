pub mod account;
pub mod auth;
pub mod browse;
pub mod config;
pub mod inventory;
pub mod listing;
pub mod offers;
pub mod taxonomy;

use crate::http::build_client;
use config::EbayConfig;
use reqwest::{Client, Response};
use std::sync::Arc;

pub use auth::{EbayAuthError, TokenGrant};
pub use listing::{ListingPolicies, PackageWeightAndSizePayload};
pub use taxonomy::EbayCondition;

/// Thin client over the eBay REST APIs the service touches (identity, browse,
/// marketplace insights, taxonomy, account, inventory). Endpoint groups live in
/// the sibling modules as separate `impl` blocks.
#[derive(Clone)]
pub struct EbayClient {
    http: Client,
    config: Arc<EbayConfig>,
}

impl EbayClient {
    pub fn new(config: EbayConfig) -> Self {
        Self {
            http: build_client(),
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> Self {
        Self::new(EbayConfig::from_env())
    }

    pub fn config(&self) -> &EbayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_root, path)
    }
}

/// Collapses a non-success response into `HTTP <status>: <body>` so marketplace
/// rejection messages survive into errors.
async fn rejection_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.trim())
    }
}
