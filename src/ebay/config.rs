use crate::http::env_opt;
use crate::models::MarketplaceId;
use once_cell::sync::Lazy;
use std::env;

pub static EBAY_ENV: Lazy<String> =
    Lazy::new(|| env::var("EBAY_ENV").unwrap_or_else(|_| "SANDBOX".to_string()));

static API_ROOT: Lazy<String> = Lazy::new(|| {
    if EBAY_ENV.as_str().eq_ignore_ascii_case("PROD") {
        "https://api.ebay.com".to_string()
    } else {
        "https://api.sandbox.ebay.com".to_string()
    }
});

static AUTH_ROOT: Lazy<String> = Lazy::new(|| {
    if EBAY_ENV.as_str().eq_ignore_ascii_case("PROD") {
        "https://auth.ebay.com".to_string()
    } else {
        "https://auth.sandbox.ebay.com".to_string()
    }
});

/// Scopes requested at authorization time and on every refresh.
pub const USER_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope",
    "https://api.ebay.com/oauth/api_scope/sell.inventory",
    "https://api.ebay.com/oauth/api_scope/sell.account",
    "https://api.ebay.com/oauth/api_scope/buy.marketplace.insights",
];

#[derive(Debug, Clone)]
pub struct EbayConfig {
    pub api_root: String,
    pub auth_root: String,
    pub app_id: String,
    pub cert_id: String,
    /// eBay "RuName"; the registered redirect target for the consent flow.
    pub ru_name: String,
    pub marketplace: MarketplaceId,
    pub category_tree_id: String,
}

impl EbayConfig {
    pub fn from_env() -> Self {
        Self {
            api_root: env_opt("EBAY_API_ROOT").unwrap_or_else(|| API_ROOT.clone()),
            auth_root: env_opt("EBAY_AUTH_ROOT").unwrap_or_else(|| AUTH_ROOT.clone()),
            app_id: env_opt("EBAY_APP_ID").unwrap_or_default(),
            cert_id: env_opt("EBAY_CERT_ID").unwrap_or_default(),
            ru_name: env_opt("EBAY_RU_NAME").unwrap_or_default(),
            marketplace: env_opt("EBAY_MARKETPLACE")
                .as_deref()
                .and_then(MarketplaceId::from_str)
                .unwrap_or_default(),
            category_tree_id: env_opt("EBAY_CATEGORY_TREE_ID").unwrap_or_else(|| "0".into()),
        }
    }

    /// Points every eBay endpoint at one root; used against mock servers.
    pub fn for_root(root: &str) -> Self {
        let root = root.trim_end_matches('/').to_string();
        Self {
            api_root: root.clone(),
            auth_root: root,
            app_id: "test-app".into(),
            cert_id: "test-cert".into(),
            ru_name: "test-ru-name".into(),
            marketplace: MarketplaceId::EbayUs,
            category_tree_id: "0".into(),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/identity/v1/oauth2/token", self.api_root)
    }
}
