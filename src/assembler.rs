use crate::content::{GeneratedContent, truncate_title};
use crate::models::{Category, ItemSpecifics, ListingDraft, ListingStatus};
use crate::search::SearchEvidence;
use crate::store::{ListingRepository, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const FILLER_SPECIFIC: (&str, &str) = ("MPN", "Does Not Apply");

/// Title keyword -> (specific name, value). Matched on whole lowercase tokens.
const KEYWORD_SPECIFICS: &[(&str, &str, &str)] = &[
    ("nintendo", "Brand", "Nintendo"),
    ("switch", "Platform", "Nintendo Switch"),
    ("playstation", "Platform", "Sony PlayStation"),
    ("ps5", "Platform", "Sony PlayStation 5"),
    ("ps4", "Platform", "Sony PlayStation 4"),
    ("xbox", "Platform", "Microsoft Xbox"),
    ("apple", "Brand", "Apple"),
    ("iphone", "Brand", "Apple"),
    ("ipad", "Brand", "Apple"),
    ("samsung", "Brand", "Samsung"),
    ("sony", "Brand", "Sony"),
    ("lego", "Brand", "LEGO"),
    ("nike", "Brand", "Nike"),
    ("adidas", "Brand", "adidas"),
    ("canon", "Brand", "Canon"),
    ("nikon", "Brand", "Nikon"),
    ("dell", "Brand", "Dell"),
    ("bose", "Brand", "Bose"),
];

fn title_tokens(title: &str) -> impl Iterator<Item = String> + '_ {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Top-hit aspects first, then title keyword inference, then the filler entry
/// only when nothing else was found. Earlier entries are never overwritten.
pub fn build_item_specifics(evidence: &SearchEvidence, title: &str) -> ItemSpecifics {
    let mut specifics = ItemSpecifics::default();
    if let Some(top) = evidence.results.first() {
        for specific in &top.item_specifics {
            specifics.insert_if_absent(&specific.name, &specific.value);
        }
    }
    for token in title_tokens(title) {
        if let Some((_, name, value)) = KEYWORD_SPECIFICS.iter().find(|(kw, _, _)| *kw == token) {
            specifics.insert_if_absent(name, value);
        }
    }
    if specifics.is_empty() {
        specifics.insert_if_absent(FILLER_SPECIFIC.0, FILLER_SPECIFIC.1);
    }
    specifics
}

/// First category seen, sold comparables before plain search hits.
pub fn pick_category(evidence: &SearchEvidence) -> Option<Category> {
    evidence
        .sold
        .iter()
        .flat_map(|item| item.categories.iter())
        .chain(evidence.results.iter().flat_map(|r| r.categories.iter()))
        .find(|c| !c.name.trim().is_empty())
        .cloned()
}

pub struct DraftParts<'a> {
    pub owner_id: &'a str,
    pub evidence: &'a SearchEvidence,
    pub content: &'a GeneratedContent,
    pub price: String,
    pub currency: &'a str,
    pub condition: &'a str,
    pub category: Option<Category>,
    pub images: Vec<String>,
}

#[derive(Clone)]
pub struct ListingAssembler {
    repo: Arc<dyn ListingRepository>,
}

impl ListingAssembler {
    pub fn new(repo: Arc<dyn ListingRepository>) -> Self {
        Self { repo }
    }

    pub fn build(&self, parts: DraftParts<'_>) -> ListingDraft {
        let title = truncate_title(&parts.content.title);
        let item_specifics = build_item_specifics(parts.evidence, &title);
        let (category_name, category_id) = match parts.category {
            Some(category) => (category.name, category.id),
            None => (String::new(), None),
        };
        let now = Utc::now();
        ListingDraft {
            id: Uuid::new_v4().to_string(),
            owner_id: parts.owner_id.to_string(),
            title,
            description: parts.content.description.clone(),
            price: parts.price,
            currency: parts.currency.to_string(),
            condition: parts.condition.trim().to_string(),
            condition_description: parts.content.condition_description.clone(),
            category_name,
            category_id,
            item_specifics,
            images: parts.images,
            external_id: None,
            status: ListingStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn persist(&self, draft: ListingDraft) -> Result<ListingDraft, StoreError> {
        self.repo.insert(draft.clone()).await?;
        info!(
            target = "snaplist.assembler",
            listing_id = %draft.id,
            owner_id = %draft.owner_id,
            specifics = draft.item_specifics.len(),
            "draft_persisted"
        );
        Ok(draft)
    }
}
