//! Fixtures shared by the async tests: an in-memory service wired against one
//! wiremock server that plays eBay and the image host.

use crate::assembler::ListingAssembler;
use crate::content::ContentEngine;
use crate::ebay::config::EbayConfig;
use crate::ebay::{EbayClient, ListingPolicies};
use crate::images::{ImageHostClient, ImageHostConfig};
use crate::llm::{LlmClient, LlmConfig};
use crate::models::{Credential, ItemSpecifics, ListingDraft, ListingStatus};
use crate::pipeline::Pipeline;
use crate::progress::ProgressTracker;
use crate::publisher::Publisher;
use crate::search::SimilaritySearch;
use crate::store::{CredentialStore, MemoryCredentialStore, MemoryListingRepository};
use crate::tokens::TokenManager;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const OWNER: &str = "owner-1";
pub const INLINE_PHOTO: &str = "data:image/jpeg;base64,aGVsbG8=";
pub const HOSTED_URL: &str = "https://img.example/hosted.jpg";

pub struct Harness {
    pub tokens: TokenManager,
    pub repo: Arc<MemoryListingRepository>,
    pub progress: ProgressTracker,
    pub pipeline: Pipeline,
    pub publisher: Publisher,
}

impl Harness {
    /// Everything points at `server`; the owner holds a token valid for an hour
    /// and the AI backend is switched off.
    pub async fn new(server: &MockServer) -> Self {
        let ebay = EbayClient::new(EbayConfig::for_root(&server.uri()));
        let credentials = MemoryCredentialStore::new();
        credentials
            .put(Credential {
                owner_id: OWNER.into(),
                access_token: "access-1".into(),
                refresh_token: Some("refresh-1".into()),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            })
            .await
            .expect("seed credential");
        let tokens = TokenManager::new(ebay.clone(), Arc::new(credentials));
        let repo = Arc::new(MemoryListingRepository::new());
        let progress = ProgressTracker::new();
        let images = ImageHostClient::new(ImageHostConfig {
            upload_url: Some(format!("{}/upload", server.uri())),
            api_key: Some("host-key".into()),
            concurrency: 2,
        });

        let pipeline = Pipeline::new(
            SimilaritySearch::new(ebay.clone(), tokens.clone()),
            ContentEngine::new(Arc::new(LlmClient::new(LlmConfig::disabled()))),
            ListingAssembler::new(repo.clone()),
            progress.clone(),
            images.clone(),
            "USD",
            12,
        );
        let publisher = Publisher::new(ebay, tokens.clone(), repo.clone(), images);
        Self {
            tokens,
            repo,
            progress,
            pipeline,
            publisher,
        }
    }
}

/// A draft that passes every publish check.
pub fn draft(owner_id: &str) -> ListingDraft {
    let mut item_specifics = ItemSpecifics::default();
    item_specifics.insert_if_absent("Brand", "Nintendo");
    let now = Utc::now();
    ListingDraft {
        id: format!("draft-{}", uuid::Uuid::new_v4().simple()),
        owner_id: owner_id.into(),
        title: "Nintendo Switch OLED Console".into(),
        description: "Console with dock and joy-cons.".into(),
        price: "230.00".into(),
        currency: "USD".into(),
        condition: "Used - Good".into(),
        condition_description: "Light wear on the dock.".into(),
        category_name: "Video Game Consoles".into(),
        category_id: Some("139971".into()),
        item_specifics,
        images: vec![INLINE_PHOTO.into(), "https://cdn.example/side.jpg".into()],
        external_id: None,
        status: ListingStatus::Draft,
        created_at: now,
        updated_at: now,
    }
}

pub fn policies() -> ListingPolicies {
    ListingPolicies {
        fulfillment_policy_id: "ship-1".into(),
        payment_policy_id: "pay-1".into(),
        return_policy_id: "ret-1".into(),
    }
}

/// Image search hit with aspects, plus four sold comparables averaging 230.
pub async fn mount_marketplace_search(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/buy/browse/v1/item_summary/search_by_image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "itemSummaries": [{
                "itemId": "v1|111|0",
                "title": "Nintendo Switch OLED Console White",
                "price": {"value": "250.00", "currency": "USD"},
                "categories": [{"categoryId": "139971", "categoryName": "Video Game Consoles"}]
            }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/buy/browse/v1/item/.+"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localizedAspects": [
                {"name": "Brand", "value": "Nintendo"},
                {"name": "Model", "value": "HEG-001"}
            ]
        })))
        .mount(server)
        .await;
    let sales: Vec<Value> = ["200.00", "220.00", "240.00", "260.00"]
        .iter()
        .enumerate()
        .map(|(i, v)| {
            json!({
                "itemId": format!("sold-{i}"),
                "title": format!("Nintendo Switch OLED #{i}"),
                "lastSoldPrice": {"value": v, "currency": "USD"},
                "lastSoldDate": "2026-09-01T00:00:00.000Z"
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/buy/marketplace_insights/v1_beta/item_sales/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "itemSales": sales })))
        .mount(server)
        .await;
}

pub async fn mount_policies(server: &MockServer) {
    for (resource, list, id) in [
        ("fulfillment_policy", "fulfillmentPolicies", "fulfillmentPolicyId"),
        ("payment_policy", "paymentPolicies", "paymentPolicyId"),
        ("return_policy", "returnPolicies", "returnPolicyId"),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/sell/account/v1/{resource}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                list: [{id: format!("{resource}-1")}]
            })))
            .mount(server)
            .await;
    }
}

pub async fn mount_image_upload(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"url": HOSTED_URL}
        })))
        .mount(server)
        .await;
}
