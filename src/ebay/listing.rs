use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPolicies {
    pub fulfillment_policy_id: String,
    pub payment_policy_id: String,
    pub return_policy_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageWeightAndSizePayload {
    pub package_weight: WeightPayload,
    pub dimensions: DimensionsPayload,
}

impl Default for PackageWeightAndSizePayload {
    /// Small-parcel defaults; drafts carry no measurements of their own.
    fn default() -> Self {
        Self {
            package_weight: WeightPayload {
                value: 2.0,
                unit: "POUND",
            },
            dimensions: DimensionsPayload {
                height: 6.0,
                length: 12.0,
                width: 9.0,
                unit: "INCH",
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightPayload {
    pub value: f64,
    pub unit: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionsPayload {
    pub height: f64,
    pub length: f64,
    pub width: f64,
    pub unit: &'static str,
}
