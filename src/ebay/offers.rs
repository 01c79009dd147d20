use super::{EbayClient, rejection_message};
use crate::ebay::listing::ListingPolicies;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EbayOfferError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("offer already exists for sku: {0}")]
    EntityExists(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingSummary {
    pub price: Price,
}

#[derive(Debug, Clone, Serialize)]
pub struct Price {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferRequest {
    pub sku: String,
    pub marketplace_id: String,
    pub format: &'static str,
    pub available_quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub listing_description: String,
    pub pricing_summary: PricingSummary,
    pub listing_policies: ListingPolicies,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferResponse {
    offer_id: String,
}

impl EbayClient {
    /// Creates an unpublished offer and returns its id.
    pub async fn create_offer(
        &self,
        request: &CreateOfferRequest,
        access_token: &str,
    ) -> Result<String, EbayOfferError> {
        let response = self
            .http
            .post(self.url("/sell/inventory/v1/offer"))
            .bearer_auth(access_token)
            .header("Content-Language", "en-US")
            .json(request)
            .send()
            .await
            .map_err(|err| EbayOfferError::Request(err.to_string()))?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(EbayOfferError::EntityExists(rejection_message(response).await));
        }
        if !response.status().is_success() {
            return Err(EbayOfferError::Request(rejection_message(response).await));
        }
        let payload: OfferResponse = response
            .json()
            .await
            .map_err(|err| EbayOfferError::Request(err.to_string()))?;
        Ok(payload.offer_id)
    }
}
