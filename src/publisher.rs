use crate::ebay::inventory::{
    InventoryAvailability, InventoryItemRequest, InventoryProduct, ShipToLocationAvailability,
};
use crate::ebay::offers::{CreateOfferRequest, Price, PricingSummary};
use crate::ebay::taxonomy::{EbayCondition, map_condition};
use crate::ebay::{EbayClient, ListingPolicies, PackageWeightAndSizePayload};
use crate::content::MAX_TITLE_CHARS;
use crate::images::ImageHostClient;
use crate::locks::KeyedLocks;
use crate::models::{ListingDraft, ListingStatus, parse_amount};
use crate::store::{ListingRepository, MarkPushed, StoreError};
use crate::tokens::{AuthenticationError, TokenManager};
use serde::Serialize;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const SKU_PREFIX: &str = "SNAP-";

/// Substituted when the seller's policies cannot be read. Real submissions
/// will usually be refused with these, so their use is always reported.
pub const PLACEHOLDER_POLICIES: [&str; 3] = [
    "PLACEHOLDER_FULFILLMENT_POLICY",
    "PLACEHOLDER_PAYMENT_POLICY",
    "PLACEHOLDER_RETURN_POLICY",
];

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("listing `{0}` not found")]
    NotFound(String),
    #[error("listing `{0}` belongs to another owner")]
    AccessDenied(String),
    #[error("listing `{0}` is already being published")]
    InProgress(String),
    #[error("listing failed validation: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error("inventory item rejected: {message}")]
    Inventory { message: String, payload: Value },
    #[error("offer rejected for sku {sku}: {message}")]
    Offer {
        message: String,
        payload: Value,
        sku: String,
        inventory_rolled_back: bool,
    },
    #[error("listing store failed: {0}")]
    Storage(#[from] StoreError),
}

/// Lifecycle of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    NotPublished,
    Validating,
    FailedValidation,
    Submitting,
    Published,
    FailedSubmission,
}

impl PublishState {
    pub fn can_advance_to(self, next: PublishState) -> bool {
        use PublishState::*;
        matches!(
            (self, next),
            (NotPublished, Validating)
                | (Validating, FailedValidation)
                | (Validating, Submitting)
                | (Submitting, Published)
                | (Submitting, FailedSubmission)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PublishState::Published | PublishState::FailedValidation | PublishState::FailedSubmission
        )
    }
}

struct Attempt<'a> {
    listing_id: &'a str,
    state: PublishState,
}

impl<'a> Attempt<'a> {
    fn new(listing_id: &'a str) -> Self {
        Self {
            listing_id,
            state: PublishState::NotPublished,
        }
    }

    fn advance(&mut self, next: PublishState) {
        if !self.state.can_advance_to(next) {
            warn!(target = "snaplist.publish", listing_id = self.listing_id, from = ?self.state, to = ?next, "unexpected_publish_transition");
        }
        info!(target = "snaplist.publish", listing_id = self.listing_id, from = ?self.state, to = ?next, "publish_state");
        self.state = next;
    }

    fn fail<T>(&mut self, next: PublishState, err: PublishError) -> Result<T, PublishError> {
        debug_assert!(next.is_terminal());
        self.advance(next);
        Err(err)
    }

    /// Gives up without a verdict on the draft; the state stays where it was.
    fn abort<T>(&self, err: PublishError) -> Result<T, PublishError> {
        warn!(target = "snaplist.publish", listing_id = self.listing_id, state = ?self.state, error = %err, "publish_aborted");
        Err(err)
    }
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub listing: ListingDraft,
    pub warnings: Vec<String>,
}

/// The exact body pair sent to the marketplace; also what error responses echo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub inventory_item: InventoryItemRequest,
    pub offer: CreateOfferRequest,
}

/// Draft checks that need no external call.
pub fn validate_draft(draft: &ListingDraft) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();
    let title_len = draft.title.trim().chars().count();
    if title_len == 0 {
        violations.push("title is required".to_string());
    } else if title_len > MAX_TITLE_CHARS {
        violations.push(format!("title exceeds {MAX_TITLE_CHARS} characters ({title_len})"));
    }
    if draft.description.trim().is_empty() {
        violations.push("description is required".to_string());
    }
    if draft.images.iter().all(|i| i.trim().is_empty()) {
        violations.push("at least one image is required".to_string());
    }
    if parse_amount(&draft.price).is_none() {
        violations.push(format!("price `{}` is not numeric", draft.price));
    }
    if violations.is_empty() { Ok(()) } else { Err(violations) }
}

fn non_empty_str<'v>(value: Option<&'v Value>) -> Option<&'v str> {
    value.and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

/// Schema checks over the combined `{inventoryItem, offer}` body, one message
/// per violation.
pub fn validate_submission(payload: &Value) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();

    match payload.get("inventoryItem") {
        None => violations.push("inventoryItem section is missing".to_string()),
        Some(item) => {
            let product = item.get("product");
            let field = |name: &str| product.and_then(|p| p.get(name));
            match non_empty_str(field("title")) {
                None => violations.push("product.title is required".to_string()),
                Some(title) if title.chars().count() > MAX_TITLE_CHARS => violations.push(format!(
                    "product.title exceeds {MAX_TITLE_CHARS} characters ({})",
                    title.chars().count()
                )),
                Some(_) => {}
            }
            if non_empty_str(field("description")).is_none() {
                violations.push("product.description is required".to_string());
            }
            if let Some(aspects) = field("aspects").and_then(Value::as_object) {
                for (name, values) in aspects {
                    if !values.is_array() {
                        violations.push(format!("aspect `{name}` must be a list of values"));
                    }
                }
            }
            let images = field("imageUrls").and_then(Value::as_array);
            if images.is_none_or(|urls| urls.is_empty()) {
                violations.push("product.imageUrls must contain at least one url".to_string());
            }
            let condition = item.get("condition").and_then(Value::as_str).unwrap_or("");
            if EbayCondition::from_code(condition).is_none() {
                violations.push(format!("condition `{condition}` is not a marketplace condition"));
            }
        }
    }

    match payload.get("offer") {
        None => violations.push("offer section is missing".to_string()),
        Some(offer) => {
            let price = offer
                .pointer("/pricingSummary/price/value")
                .and_then(Value::as_str)
                .unwrap_or("");
            if parse_amount(price).is_none() {
                violations.push(format!("offer price `{price}` is not numeric"));
            }
            for policy in ["fulfillmentPolicyId", "paymentPolicyId", "returnPolicyId"] {
                if non_empty_str(offer.pointer(&format!("/listingPolicies/{policy}"))).is_none() {
                    violations.push(format!("offer.listingPolicies.{policy} is required"));
                }
            }
        }
    }

    if violations.is_empty() { Ok(()) } else { Err(violations) }
}

fn category_id(draft: &ListingDraft) -> Option<String> {
    draft
        .category_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn generate_sku() -> String {
    format!("{SKU_PREFIX}{}", Uuid::new_v4().simple())
}

/// Pushes drafts to the marketplace as inventory item + offer. Attempts on the
/// same draft are serialized in-process by a keyed lock and across instances
/// by the repository's publish claim, so a pushed draft is never offered twice.
#[derive(Clone)]
pub struct Publisher {
    ebay: EbayClient,
    tokens: TokenManager,
    repo: Arc<dyn ListingRepository>,
    images: ImageHostClient,
    locks: KeyedLocks,
}

impl Publisher {
    pub fn new(
        ebay: EbayClient,
        tokens: TokenManager,
        repo: Arc<dyn ListingRepository>,
        images: ImageHostClient,
    ) -> Self {
        Self {
            ebay,
            tokens,
            repo,
            images,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn publish(
        &self,
        owner_id: &str,
        listing_id: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let _guard = self.locks.lock(listing_id).await;
        if !self.repo.claim_publish(listing_id).await? {
            info!(target = "snaplist.publish", listing_id, "publish_claim_held_elsewhere");
            return Err(PublishError::InProgress(listing_id.to_string()));
        }
        let result = self.publish_claimed(owner_id, listing_id).await;
        if let Err(err) = self.repo.release_publish(listing_id).await {
            warn!(target = "snaplist.publish", listing_id, error = %err, "publish_claim_release_failed");
        }
        result
    }

    async fn publish_claimed(
        &self,
        owner_id: &str,
        listing_id: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let draft = self
            .repo
            .get(listing_id)
            .await?
            .ok_or_else(|| PublishError::NotFound(listing_id.to_string()))?;
        if draft.owner_id != owner_id {
            return Err(PublishError::AccessDenied(listing_id.to_string()));
        }
        if draft.status == ListingStatus::Pushed && draft.external_id.is_some() {
            info!(target = "snaplist.publish", listing_id, "already_published");
            return Ok(PublishOutcome {
                listing: draft,
                warnings: Vec::new(),
            });
        }

        let mut attempt = Attempt::new(listing_id);
        attempt.advance(PublishState::Validating);
        if let Err(violations) = validate_draft(&draft) {
            return attempt.fail(PublishState::FailedValidation, PublishError::Validation(violations));
        }

        let token = match self.tokens.ensure_valid_token(owner_id).await {
            Ok(token) => token,
            Err(err) => return attempt.abort(err.into()),
        };
        let mut warnings = Vec::new();
        let condition = map_condition(&draft.condition);
        let policies = self.resolve_policies(&token, &mut warnings).await;
        let hosted = self.images.host_all(&draft.images).await;
        if hosted.placeholder_used {
            warnings.push("no image could be hosted; a placeholder image was submitted".to_string());
        } else if hosted.failed > 0 {
            warnings.push(format!("{} image(s) could not be hosted and were dropped", hosted.failed));
        }
        if category_id(&draft).is_none() {
            warnings.push(
                "no category id; the offer was created without one and needs a category before it can go live"
                    .to_string(),
            );
        }

        let sku = generate_sku();
        let submission = self.build_submission(&draft, &sku, condition, policies, hosted.urls);
        let payload = match serde_json::to_value(&submission) {
            Ok(payload) => payload,
            Err(err) => {
                return attempt.fail(
                    PublishState::FailedValidation,
                    PublishError::Validation(vec![format!("payload not serializable: {err}")]),
                );
            }
        };
        if let Err(violations) = validate_submission(&payload) {
            return attempt.fail(PublishState::FailedValidation, PublishError::Validation(violations));
        }

        attempt.advance(PublishState::Submitting);
        if let Err(err) = self
            .ebay
            .upsert_inventory_item(&sku, &submission.inventory_item, &token)
            .await
        {
            warn!(target = "snaplist.publish", listing_id, sku = %sku, error = %err, "inventory_item_rejected");
            return attempt.fail(
                PublishState::FailedSubmission,
                PublishError::Inventory {
                    message: err.to_string(),
                    payload,
                },
            );
        }

        let offer_id = match self.ebay.create_offer(&submission.offer, &token).await {
            Ok(offer_id) => offer_id,
            Err(err) => {
                warn!(target = "snaplist.publish", listing_id, sku = %sku, error = %err, "offer_rejected");
                let inventory_rolled_back = self.roll_back_inventory(&sku, &token).await;
                return attempt.fail(
                    PublishState::FailedSubmission,
                    PublishError::Offer {
                        message: err.to_string(),
                        payload,
                        sku,
                        inventory_rolled_back,
                    },
                );
            }
        };

        let listing = match self.repo.mark_pushed(listing_id, &offer_id).await {
            Ok(MarkPushed::Updated(listing)) => listing,
            Ok(MarkPushed::AlreadyPushed(listing)) => {
                warn!(target = "snaplist.publish", listing_id, offer_id = %offer_id, "draft_pushed_concurrently");
                listing
            }
            Err(err) => return attempt.fail(PublishState::FailedSubmission, err.into()),
        };
        attempt.advance(PublishState::Published);
        info!(target = "snaplist.publish", listing_id, sku = %sku, offer_id = %offer_id, warnings = warnings.len(), "listing_published");
        Ok(PublishOutcome { listing, warnings })
    }

    async fn resolve_policies(&self, token: &str, warnings: &mut Vec<String>) -> ListingPolicies {
        match self.ebay.fetch_listing_policies(token).await {
            Ok(policies) => policies,
            Err(err) => {
                warn!(target = "snaplist.publish", error = %err, "policy_lookup_failed_using_placeholders");
                warnings.push(format!(
                    "seller policies unavailable ({err}); placeholder policy ids were submitted"
                ));
                let [fulfillment, payment, ret] = PLACEHOLDER_POLICIES;
                ListingPolicies {
                    fulfillment_policy_id: fulfillment.to_string(),
                    payment_policy_id: payment.to_string(),
                    return_policy_id: ret.to_string(),
                }
            }
        }
    }

    /// Compensating delete for an inventory item whose offer was refused.
    async fn roll_back_inventory(&self, sku: &str, token: &str) -> bool {
        match self.ebay.delete_inventory_item(sku, token).await {
            Ok(()) => {
                info!(target = "snaplist.publish", sku, "orphan_inventory_deleted");
                true
            }
            Err(err) => {
                warn!(target = "snaplist.publish", sku, error = %err, "orphan_inventory_left");
                false
            }
        }
    }

    fn build_submission(
        &self,
        draft: &ListingDraft,
        sku: &str,
        condition: EbayCondition,
        policies: ListingPolicies,
        image_urls: Vec<String>,
    ) -> SubmissionPayload {
        let aspects: BTreeMap<String, Vec<String>> = draft
            .item_specifics
            .iter()
            .map(|s| (s.name.clone(), vec![s.value.clone()]))
            .collect();
        let condition_description = Some(draft.condition_description.trim().to_string())
            .filter(|d| !d.is_empty());
        SubmissionPayload {
            inventory_item: InventoryItemRequest {
                availability: InventoryAvailability {
                    ship_to_location_availability: ShipToLocationAvailability { quantity: 1 },
                },
                condition: condition.code().to_string(),
                condition_description,
                product: InventoryProduct {
                    title: draft.title.trim().to_string(),
                    description: draft.description.clone(),
                    aspects,
                    image_urls,
                },
                package_weight_and_size: Some(PackageWeightAndSizePayload::default()),
            },
            offer: CreateOfferRequest {
                sku: sku.to_string(),
                marketplace_id: self.ebay.config().marketplace.ebay_code().to_string(),
                format: "FIXED_PRICE",
                available_quantity: 1,
                category_id: category_id(draft),
                listing_description: draft.description.clone(),
                pricing_summary: PricingSummary {
                    price: Price {
                        value: draft.price.clone(),
                        currency: draft.currency.clone(),
                    },
                },
                listing_policies: policies,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::PLACEHOLDER_IMAGE_URL;
    use crate::testkit::{self, OWNER};
    use serde_json::json;
    use wiremock::matchers::{any, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INVENTORY_PATH: &str = r"^/sell/inventory/v1/inventory_item/SNAP-[0-9a-f]{32}$";

    #[test]
    fn draft_violations_are_listed_individually() {
        let mut draft = testkit::draft(OWNER);
        draft.title = "x".repeat(81);
        draft.images.clear();
        draft.price = "ten".into();
        draft.category_id = None;
        let violations = validate_draft(&draft).expect_err("invalid");
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().all(|v| !v.contains("category")));
        assert!(violations[0].contains("title exceeds 80"));
        assert!(validate_draft(&testkit::draft(OWNER)).is_ok());
    }

    #[test]
    fn submission_schema_rejections() {
        let payload = json!({
            "inventoryItem": {
                "condition": "USED_GOOD",
                "product": {
                    "title": "t".repeat(90),
                    "description": "desc",
                    "aspects": {"Brand": "Sony", "Color": ["Black"]},
                    "imageUrls": []
                }
            }
        });
        let violations = validate_submission(&payload).expect_err("invalid");
        assert_eq!(
            violations,
            vec![
                "product.title exceeds 80 characters (90)",
                "aspect `Brand` must be a list of values",
                "product.imageUrls must contain at least one url",
                "offer section is missing",
            ]
        );

        let missing_item = json!({"offer": {
            "categoryId": "1",
            "pricingSummary": {"price": {"value": "5.00", "currency": "USD"}},
            "listingPolicies": {"fulfillmentPolicyId": "f", "paymentPolicyId": "p", "returnPolicyId": "r"}
        }});
        assert_eq!(
            validate_submission(&missing_item).expect_err("invalid"),
            vec!["inventoryItem section is missing"]
        );
    }

    #[test]
    fn built_payload_passes_its_own_schema() {
        let ebay = EbayClient::new(crate::ebay::config::EbayConfig::for_root("http://unused"));
        let publisher = Publisher::new(
            ebay.clone(),
            TokenManager::new(ebay, Arc::new(crate::store::MemoryCredentialStore::new())),
            Arc::new(crate::store::MemoryListingRepository::new()),
            ImageHostClient::new(crate::images::ImageHostConfig {
                upload_url: None,
                api_key: None,
                concurrency: 1,
            }),
        );
        let draft = testkit::draft(OWNER);
        let submission = publisher.build_submission(
            &draft,
            "SNAP-1",
            map_condition(&draft.condition),
            testkit::policies(),
            vec!["https://img.example/1.jpg".into()],
        );
        let payload = serde_json::to_value(&submission).unwrap();
        assert!(validate_submission(&payload).is_ok());
        assert_eq!(payload["inventoryItem"]["condition"], json!("USED_GOOD"));
        assert_eq!(
            payload["inventoryItem"]["availability"]["shipToLocationAvailability"]["quantity"],
            json!(1)
        );
        assert_eq!(payload["inventoryItem"]["product"]["aspects"]["Brand"], json!(["Nintendo"]));
        assert_eq!(payload["offer"]["sku"], json!("SNAP-1"));
        assert_eq!(payload["offer"]["marketplaceId"], json!("EBAY_US"));
        assert_eq!(payload["offer"]["categoryId"], json!("139971"));

        let mut uncategorized = draft.clone();
        uncategorized.category_id = Some("  ".into());
        let submission = publisher.build_submission(
            &uncategorized,
            "SNAP-2",
            map_condition(&draft.condition),
            testkit::policies(),
            vec!["https://img.example/1.jpg".into()],
        );
        let payload = serde_json::to_value(&submission).unwrap();
        assert!(validate_submission(&payload).is_ok());
        assert!(payload["offer"].get("categoryId").is_none());
    }

    #[test]
    fn attempt_transitions() {
        use PublishState::*;
        assert!(NotPublished.can_advance_to(Validating));
        assert!(Validating.can_advance_to(Submitting));
        assert!(Submitting.can_advance_to(FailedSubmission));
        assert!(!NotPublished.can_advance_to(Submitting));
        assert!(!Published.can_advance_to(Validating));
        assert!(FailedValidation.is_terminal() && Published.is_terminal());
        assert!(!Submitting.is_terminal());
    }

    #[tokio::test]
    async fn invalid_draft_makes_no_external_calls() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let harness = testkit::Harness::new(&server).await;
        let mut draft = testkit::draft(OWNER);
        draft.title = String::new();
        draft.images.clear();
        harness.repo.insert(draft.clone()).await.unwrap();

        let err = harness
            .publisher
            .publish(OWNER, &draft.id)
            .await
            .expect_err("invalid");
        let PublishError::Validation(violations) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(violations.len(), 2);
    }

    #[tokio::test]
    async fn other_owners_are_refused() {
        let server = MockServer::start().await;
        let harness = testkit::Harness::new(&server).await;
        let draft = testkit::draft(OWNER);
        harness.repo.insert(draft.clone()).await.unwrap();
        assert!(matches!(
            harness.publisher.publish("someone-else", &draft.id).await,
            Err(PublishError::AccessDenied(_))
        ));
        assert!(matches!(
            harness.publisher.publish(OWNER, "missing").await,
            Err(PublishError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn republish_returns_same_offer_once() {
        let server = MockServer::start().await;
        testkit::mount_policies(&server).await;
        testkit::mount_image_upload(&server).await;
        Mock::given(method("PUT"))
            .and(path_regex(INVENTORY_PATH))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/offer"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"offerId": "OFFER-1"})))
            .expect(1)
            .mount(&server)
            .await;
        let harness = testkit::Harness::new(&server).await;
        let draft = testkit::draft(OWNER);
        harness.repo.insert(draft.clone()).await.unwrap();

        let (first, second) = tokio::join!(
            harness.publisher.publish(OWNER, &draft.id),
            harness.publisher.publish(OWNER, &draft.id)
        );
        let first = first.expect("publish");
        let second = second.expect("republish");
        assert!(first.warnings.is_empty());
        assert_eq!(first.listing.status, ListingStatus::Pushed);
        assert_eq!(first.listing.external_id.as_deref(), Some("OFFER-1"));
        assert_eq!(second.listing.external_id.as_deref(), Some("OFFER-1"));

        let third = harness.publisher.publish(OWNER, &draft.id).await.expect("again");
        assert_eq!(third.listing.external_id.as_deref(), Some("OFFER-1"));
    }

    #[tokio::test]
    async fn refused_offer_rolls_back_inventory() {
        let server = MockServer::start().await;
        testkit::mount_policies(&server).await;
        testkit::mount_image_upload(&server).await;
        Mock::given(method("PUT"))
            .and(path_regex(INVENTORY_PATH))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/offer"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [{"errorId": 25002, "message": "Invalid category"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(INVENTORY_PATH))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let harness = testkit::Harness::new(&server).await;
        let draft = testkit::draft(OWNER);
        harness.repo.insert(draft.clone()).await.unwrap();

        let err = harness.publisher.publish(OWNER, &draft.id).await.expect_err("offer refused");
        let PublishError::Offer {
            message,
            payload,
            sku,
            inventory_rolled_back,
        } = err
        else {
            panic!("expected offer error, got {err:?}");
        };
        assert!(inventory_rolled_back);
        assert!(sku.starts_with(SKU_PREFIX));
        assert!(message.contains("Invalid category"));
        assert_eq!(payload["offer"]["sku"], json!(sku));

        let stored = harness.repo.get(&draft.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ListingStatus::Draft);
        assert!(stored.external_id.is_none());
    }

    #[tokio::test]
    async fn refused_inventory_skips_offer() {
        let server = MockServer::start().await;
        testkit::mount_policies(&server).await;
        testkit::mount_image_upload(&server).await;
        Mock::given(method("PUT"))
            .and(path_regex(INVENTORY_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad aspects"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/offer"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let harness = testkit::Harness::new(&server).await;
        let draft = testkit::draft(OWNER);
        harness.repo.insert(draft.clone()).await.unwrap();

        match harness.publisher.publish(OWNER, &draft.id).await {
            Err(PublishError::Inventory { message, payload }) => {
                assert!(message.contains("bad aspects"));
                assert!(payload.get("inventoryItem").is_some());
            }
            other => panic!("expected inventory error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn placeholders_are_reported_as_warnings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/sell/account/v1/.+_policy$"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(INVENTORY_PATH))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/offer"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"offerId": "OFFER-9"})))
            .mount(&server)
            .await;
        let harness = testkit::Harness::new(&server).await;
        let mut draft = testkit::draft(OWNER);
        draft.images = vec![testkit::INLINE_PHOTO.into()];
        harness.repo.insert(draft.clone()).await.unwrap();

        let outcome = harness.publisher.publish(OWNER, &draft.id).await.expect("publish");
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.warnings[0].contains("placeholder policy ids"));
        assert!(outcome.warnings[1].contains("placeholder image"));
        assert_eq!(outcome.listing.external_id.as_deref(), Some("OFFER-9"));

        let requests = server.received_requests().await.unwrap_or_default();
        let inventory_put = requests
            .iter()
            .find(|r| r.method.as_str() == "PUT")
            .expect("inventory put");
        let body: Value = serde_json::from_slice(&inventory_put.body).unwrap();
        assert_eq!(body["product"]["imageUrls"], json!([PLACEHOLDER_IMAGE_URL]));
    }

    #[tokio::test]
    async fn missing_credential_is_not_a_validation_failure() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let harness = testkit::Harness::new(&server).await;
        let draft = testkit::draft("unlinked-owner");
        harness.repo.insert(draft.clone()).await.unwrap();

        let err = harness
            .publisher
            .publish("unlinked-owner", &draft.id)
            .await
            .expect_err("no credential");
        assert!(matches!(err, PublishError::Authentication(_)), "got {err:?}");
        let stored = harness.repo.get(&draft.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ListingStatus::Draft);
        assert!(harness.repo.claim_publish(&draft.id).await.unwrap());
    }

    #[tokio::test]
    async fn claim_held_elsewhere_blocks_submission() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let harness = testkit::Harness::new(&server).await;
        let draft = testkit::draft(OWNER);
        harness.repo.insert(draft.clone()).await.unwrap();
        assert!(harness.repo.claim_publish(&draft.id).await.unwrap());

        let err = harness.publisher.publish(OWNER, &draft.id).await.expect_err("claimed");
        assert!(matches!(err, PublishError::InProgress(ref id) if id == &draft.id), "got {err:?}");
        let stored = harness.repo.get(&draft.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ListingStatus::Draft);
        assert!(stored.external_id.is_none());
    }

    #[tokio::test]
    async fn uncategorized_draft_publishes_with_warning() {
        use crate::pipeline::JobContext;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/buy/browse/v1/item_summary/search_by_image"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/commerce/taxonomy/v1/.+"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        testkit::mount_policies(&server).await;
        testkit::mount_image_upload(&server).await;
        Mock::given(method("PUT"))
            .and(path_regex(INVENTORY_PATH))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sell/inventory/v1/offer"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"offerId": "OFFER-7"})))
            .expect(1)
            .mount(&server)
            .await;
        let harness = testkit::Harness::new(&server).await;

        let generated = harness
            .pipeline
            .run(JobContext {
                job_id: "uncategorized".into(),
                owner_id: OWNER.into(),
                condition: "Used - Good".into(),
                condition_level: 3,
                images: vec![testkit::INLINE_PHOTO.into()],
            })
            .await
            .expect("draft despite no signal");
        let draft = harness.repo.get(&generated.listing_id).await.unwrap().unwrap();
        assert!(draft.category_id.is_none());

        let outcome = harness.publisher.publish(OWNER, &draft.id).await.expect("publish");
        assert_eq!(outcome.listing.external_id.as_deref(), Some("OFFER-7"));
        assert!(outcome.warnings.iter().any(|w| w.contains("no category id")));

        let requests = server.received_requests().await.unwrap_or_default();
        let offer_post = requests
            .iter()
            .find(|r| r.method.as_str() == "POST" && r.url.path() == "/sell/inventory/v1/offer")
            .expect("offer post");
        let body: Value = serde_json::from_slice(&offer_post.body).unwrap();
        assert!(body.get("categoryId").is_none());
        assert!(harness.repo.claim_publish(&draft.id).await.unwrap());
    }
}
