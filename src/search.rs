use crate::ebay::EbayClient;
use crate::images::InlineImage;
use crate::models::{Category, SearchResult, SoldItem};
use crate::signal::Signal;
use crate::tokens::TokenManager;
use tracing::{info, warn};

const KEYWORD_TOKENS: usize = 3;

/// Everything the marketplace told us about the photographed product.
#[derive(Debug, Clone, Default)]
pub struct SearchEvidence {
    pub results: Vec<SearchResult>,
    pub sold: Vec<SoldItem>,
    pub keywords: Option<String>,
}

impl SearchEvidence {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.sold.is_empty()
    }
}

/// First three whitespace-separated tokens of the top result's title.
pub fn derive_keywords(results: &[SearchResult]) -> Option<String> {
    let title = results.first()?.title.trim();
    let keywords = title
        .split_whitespace()
        .take(KEYWORD_TOKENS)
        .collect::<Vec<_>>()
        .join(" ");
    (!keywords.is_empty()).then_some(keywords)
}

/// Image and keyword search against the marketplace. Nothing here fails the
/// caller: auth, network and API errors are logged and read as "no evidence".
#[derive(Clone)]
pub struct SimilaritySearch {
    ebay: EbayClient,
    tokens: TokenManager,
}

impl SimilaritySearch {
    pub fn new(ebay: EbayClient, tokens: TokenManager) -> Self {
        Self { ebay, tokens }
    }

    async fn token(&self, owner_id: &str) -> Result<String, String> {
        self.tokens
            .ensure_valid_token(owner_id)
            .await
            .map_err(|err| err.to_string())
    }

    pub async fn search_by_image(
        &self,
        owner_id: &str,
        image: &InlineImage,
    ) -> Signal<Vec<SearchResult>> {
        let token = match self.token(owner_id).await {
            Ok(token) => token,
            Err(err) => return Signal::Failed(err),
        };
        let mut signal = Signal::from_list(self.ebay.search_by_image(&image.data, &token).await);

        // Aspects are only on the full item record; one lookup for the top hit.
        if let Signal::Found(results) = &mut signal
            && let Some(top) = results.first_mut()
        {
            match self.ebay.item_specifics(&top.item_id, &token).await {
                Ok(specifics) => top.item_specifics = specifics,
                Err(err) => {
                    warn!(target = "snaplist.search", item_id = %top.item_id, error = %err, "item_detail_lookup_failed")
                }
            }
        }
        signal
    }

    pub async fn get_sold_items(&self, owner_id: &str, keywords: &str) -> Signal<Vec<SoldItem>> {
        let token = match self.token(owner_id).await {
            Ok(token) => token,
            Err(err) => return Signal::Failed(err),
        };
        Signal::from_list(self.ebay.search_sold_items(keywords, &token).await)
    }

    /// Image search, then sold comparables keyed off the top hit.
    pub async fn gather(&self, owner_id: &str, image: Option<&InlineImage>) -> SearchEvidence {
        let results = match image {
            Some(image) => self.search_by_image(owner_id, image).await,
            None => Signal::Empty,
        };
        if let Signal::Failed(err) = &results {
            warn!(target = "snaplist.search", owner_id, error = %err, "image_search_failed");
        }
        let results = results.into_items();

        let keywords = derive_keywords(&results);
        let sold = match keywords.as_deref() {
            Some(keywords) => {
                let sold = self.get_sold_items(owner_id, keywords).await;
                if let Signal::Failed(err) = &sold {
                    warn!(target = "snaplist.search", owner_id, keywords, error = %err, "sold_search_failed");
                }
                sold.into_items()
            }
            None => Vec::new(),
        };

        info!(
            target = "snaplist.search",
            owner_id,
            results = results.len(),
            sold = sold.len(),
            "search_evidence_gathered"
        );
        SearchEvidence {
            results,
            sold,
            keywords,
        }
    }

    /// Taxonomy suggestion for free text; `None` on any failure.
    pub async fn suggest_category(&self, owner_id: &str, query: &str) -> Option<Category> {
        let token = self.token(owner_id).await.ok()?;
        match self.ebay.suggest_category(query, &token).await {
            Ok(category) => category,
            Err(err) => {
                warn!(target = "snaplist.search", owner_id, error = %err, "category_suggestion_failed");
                None
            }
        }
    }
}
