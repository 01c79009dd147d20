use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub value: String,
    pub currency: String,
}

impl Money {
    pub fn amount(&self) -> Option<f64> {
        parse_amount(&self.value)
    }
}

/// Finite, non-negative decimal parse. Anything else is "not numeric".
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpecific {
    pub name: String,
    pub value: String,
}

impl ItemSpecific {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Insertion-ordered specifics with unique (case-insensitive) names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemSpecifics(Vec<ItemSpecific>);

impl ItemSpecifics {
    /// First writer wins; returns whether the entry was taken.
    pub fn insert_if_absent(&mut self, name: &str, value: &str) -> bool {
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() || self.contains(name) {
            return false;
        }
        self.0.push(ItemSpecific::new(name, value));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| s.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemSpecific> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub item_id: String,
    pub title: String,
    pub price: Option<Money>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub item_specifics: Vec<ItemSpecific>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoldItem {
    pub item_id: String,
    pub title: String,
    pub price: Option<Money>,
    pub sold_price: Option<Money>,
    pub sold_date: Option<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    Pushed,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDraft {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    /// Non-negative decimal string with two places.
    pub price: String,
    pub currency: String,
    pub condition: String,
    pub condition_description: String,
    pub category_name: String,
    pub category_id: Option<String>,
    pub item_specifics: ItemSpecifics,
    /// Data URLs (`data:image/...;base64,`) or already-hosted http(s) URLs.
    pub images: Vec<String>,
    pub external_id: Option<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored OAuth grant for one owner. `expires_at` is `None` when the
/// marketplace never told us, which forces a refresh on next use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub owner_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default, alias = "jobId")]
    pub job_id: Option<String>,
    pub condition: String,
    #[serde(alias = "conditionLevel")]
    pub condition_level: u8,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub listing_id: String,
    pub job_id: String,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub name: String,
    pub steps_completed: u8,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, steps_completed: u8, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            steps_completed,
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishResponse {
    pub success: bool,
    pub listing: ListingDraft,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: Option<String>,
    pub violations: Option<Vec<String>>,
    pub payload: Option<Value>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: Some(detail.into()),
            violations: None,
            payload: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(clippy::enum_variant_names)]
pub enum MarketplaceId {
    #[default]
    EbayUs,
    EbayUk,
    EbayDe,
}

impl MarketplaceId {
    pub fn ebay_code(&self) -> &'static str {
        match self {
            MarketplaceId::EbayUs => "EBAY_US",
            MarketplaceId::EbayUk => "EBAY_GB",
            MarketplaceId::EbayDe => "EBAY_DE",
        }
    }

    pub fn currency(&self) -> &'static str {
        match self {
            MarketplaceId::EbayUs => "USD",
            MarketplaceId::EbayUk => "GBP",
            MarketplaceId::EbayDe => "EUR",
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_uppercase().as_str() {
            "EBAY_US" => Some(MarketplaceId::EbayUs),
            "EBAY_GB" | "EBAY_UK" => Some(MarketplaceId::EbayUk),
            "EBAY_DE" => Some(MarketplaceId::EbayDe),
            _ => None,
        }
    }
}
