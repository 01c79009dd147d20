use super::{EbayClient, rejection_message};
use crate::ebay::listing::ListingPolicies;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EbayAccountError {
    #[error("policy request failed: {0}")]
    Request(String),
    #[error("no {0} policy configured on the seller account")]
    Missing(&'static str),
}

impl EbayClient {
    /// First fulfillment/payment/return policy of the seller for the configured
    /// marketplace.
    pub async fn fetch_listing_policies(
        &self,
        access_token: &str,
    ) -> Result<ListingPolicies, EbayAccountError> {
        Ok(ListingPolicies {
            fulfillment_policy_id: self
                .first_policy_id(
                    "fulfillment_policy",
                    "fulfillmentPolicies",
                    "fulfillmentPolicyId",
                    access_token,
                )
                .await?,
            payment_policy_id: self
                .first_policy_id(
                    "payment_policy",
                    "paymentPolicies",
                    "paymentPolicyId",
                    access_token,
                )
                .await?,
            return_policy_id: self
                .first_policy_id(
                    "return_policy",
                    "returnPolicies",
                    "returnPolicyId",
                    access_token,
                )
                .await?,
        })
    }

    async fn first_policy_id(
        &self,
        resource: &'static str,
        list_field: &str,
        id_field: &str,
        access_token: &str,
    ) -> Result<String, EbayAccountError> {
        let response = self
            .http
            .get(self.url(&format!("/sell/account/v1/{resource}")))
            .query(&[("marketplace_id", self.config().marketplace.ebay_code())])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| EbayAccountError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(EbayAccountError::Request(rejection_message(response).await));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| EbayAccountError::Request(err.to_string()))?;
        payload
            .get(list_field)
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(|policy| policy.get(id_field))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(EbayAccountError::Missing(resource))
    }
}
