#![allow(non_snake_case)]

use super::{EbayClient, rejection_message};
use crate::models::{Category, ItemSpecific, Money, SearchResult, SoldItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use urlencoding::encode;

const RESULT_LIMIT: &str = "10";

#[derive(Debug, Error)]
pub enum EbayBrowseError {
    #[error("browse request failed: {0}")]
    Request(String),
}

#[derive(Serialize)]
struct ImageSearchBody<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct ItemSummaryPage {
    #[serde(default)]
    itemSummaries: Vec<ItemSummary>,
}

#[derive(Debug, Deserialize)]
struct ItemSummary {
    itemId: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    price: Option<Money>,
    #[serde(default)]
    categories: Vec<WireCategory>,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    #[serde(default)]
    categoryId: Option<String>,
    #[serde(default)]
    categoryName: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemSalesPage {
    #[serde(default)]
    itemSales: Vec<ItemSale>,
}

#[derive(Debug, Deserialize)]
struct ItemSale {
    itemId: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    price: Option<Money>,
    #[serde(default)]
    lastSoldPrice: Option<Money>,
    #[serde(default)]
    lastSoldDate: Option<String>,
    #[serde(default)]
    categories: Vec<WireCategory>,
}

#[derive(Debug, Deserialize)]
struct ItemDetail {
    #[serde(default, rename = "localizedAspects")]
    localized_aspects: Vec<LocalizedAspect>,
}

#[derive(Debug, Deserialize)]
struct LocalizedAspect {
    name: String,
    value: String,
}

fn categories(raw: Vec<WireCategory>) -> Vec<Category> {
    raw.into_iter()
        .filter_map(|c| {
            let name = c.categoryName?.trim().to_string();
            (!name.is_empty()).then(|| Category {
                id: c.categoryId.filter(|id| !id.trim().is_empty()),
                name,
            })
        })
        .collect()
}

impl EbayClient {
    /// `search_by_image` takes the raw base64 payload, no data-URL prefix.
    pub async fn search_by_image(
        &self,
        image_base64: &str,
        access_token: &str,
    ) -> Result<Vec<SearchResult>, EbayBrowseError> {
        let response = self
            .http
            .post(self.url("/buy/browse/v1/item_summary/search_by_image"))
            .query(&[("limit", RESULT_LIMIT)])
            .bearer_auth(access_token)
            .header("X-EBAY-C-MARKETPLACE-ID", self.config().marketplace.ebay_code())
            .json(&ImageSearchBody {
                image: image_base64,
            })
            .send()
            .await
            .map_err(|err| EbayBrowseError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EbayBrowseError::Request(rejection_message(response).await));
        }
        let page: ItemSummaryPage = response
            .json()
            .await
            .map_err(|err| EbayBrowseError::Request(err.to_string()))?;
        Ok(page
            .itemSummaries
            .into_iter()
            .map(|item| SearchResult {
                item_id: item.itemId,
                title: item.title,
                price: item.price,
                categories: categories(item.categories),
                item_specifics: Vec::new(),
            })
            .collect())
    }

    pub async fn search_sold_items(
        &self,
        keywords: &str,
        access_token: &str,
    ) -> Result<Vec<SoldItem>, EbayBrowseError> {
        let response = self
            .http
            .get(self.url("/buy/marketplace_insights/v1_beta/item_sales/search"))
            .query(&[("q", keywords), ("limit", RESULT_LIMIT)])
            .bearer_auth(access_token)
            .header("X-EBAY-C-MARKETPLACE-ID", self.config().marketplace.ebay_code())
            .send()
            .await
            .map_err(|err| EbayBrowseError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EbayBrowseError::Request(rejection_message(response).await));
        }
        let page: ItemSalesPage = response
            .json()
            .await
            .map_err(|err| EbayBrowseError::Request(err.to_string()))?;
        Ok(page
            .itemSales
            .into_iter()
            .map(|sale| SoldItem {
                item_id: sale.itemId,
                title: sale.title,
                price: sale.price,
                sold_price: sale.lastSoldPrice,
                sold_date: sale.lastSoldDate,
                categories: categories(sale.categories),
            })
            .collect())
    }

    /// Item specifics of a single listing, as `(name, value)` pairs.
    pub async fn item_specifics(
        &self,
        item_id: &str,
        access_token: &str,
    ) -> Result<Vec<ItemSpecific>, EbayBrowseError> {
        let response = self
            .http
            .get(self.url(&format!("/buy/browse/v1/item/{}", encode(item_id))))
            .bearer_auth(access_token)
            .header("X-EBAY-C-MARKETPLACE-ID", self.config().marketplace.ebay_code())
            .send()
            .await
            .map_err(|err| EbayBrowseError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EbayBrowseError::Request(rejection_message(response).await));
        }
        let detail: ItemDetail = response
            .json()
            .await
            .map_err(|err| EbayBrowseError::Request(err.to_string()))?;
        Ok(detail
            .localized_aspects
            .into_iter()
            .filter(|a| !a.name.trim().is_empty() && !a.value.trim().is_empty())
            .map(|a| ItemSpecific::new(a.name.trim(), a.value.trim()))
            .collect())
    }
}
