use super::{EbayClient, rejection_message};
use crate::ebay::listing::PackageWeightAndSizePayload;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use urlencoding::encode;

#[derive(Debug, Error)]
pub enum EbayInventoryError {
    #[error("request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemRequest {
    pub availability: InventoryAvailability,
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_description: Option<String>,
    pub product: InventoryProduct,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_weight_and_size: Option<PackageWeightAndSizePayload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAvailability {
    pub ship_to_location_availability: ShipToLocationAvailability,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipToLocationAvailability {
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryProduct {
    pub title: String,
    pub description: String,
    pub aspects: BTreeMap<String, Vec<String>>,
    pub image_urls: Vec<String>,
}

impl EbayClient {
    pub async fn upsert_inventory_item(
        &self,
        sku: &str,
        payload: &InventoryItemRequest,
        access_token: &str,
    ) -> Result<(), EbayInventoryError> {
        let url = self.url(&format!("/sell/inventory/v1/inventory_item/{}", encode(sku)));
        let response = self
            .http
            .put(url)
            .bearer_auth(access_token)
            .header("Content-Language", "en-US")
            .json(payload)
            .send()
            .await
            .map_err(|err| EbayInventoryError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(EbayInventoryError::Request(rejection_message(response).await));
        }
        Ok(())
    }

    pub async fn delete_inventory_item(
        &self,
        sku: &str,
        access_token: &str,
    ) -> Result<(), EbayInventoryError> {
        let url = self.url(&format!("/sell/inventory/v1/inventory_item/{}", encode(sku)));
        let response = self
            .http
            .delete(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| EbayInventoryError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EbayInventoryError::Request(rejection_message(response).await));
        }
        Ok(())
    }
}
