use crate::images::InlineImage;
use crate::llm::{ContentBlock, LlmClient, LlmMessage, MessageContent};
use crate::pricing::{format_price, mean};
use crate::search::SearchEvidence;
use crate::signal::Signal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const MAX_TITLE_CHARS: usize = 80;
const MAX_COMPARABLES: usize = 3;
const GENERIC_TITLE: &str = "Pre-owned item";

pub const ANALYSIS_PLACEHOLDER: &str =
    "Product details could not be determined automatically from the photos.";

const VISION_PROMPT: &str = "Identify the product in this photo for a marketplace listing. \
Give the likely brand, model, type of item, colour and any visible wear. Plain text, no more than 120 words.";

const CONTENT_PROMPT: &str = r#"
You write marketplace listings. Using the product details, the seller's condition label and the
condition level (1 = heavily worn, 5 = new), reply with a single JSON object:
{"title": string (at most 80 characters), "description": string, "conditionDescription": string}.
Output JSON only.
"#;

#[derive(Debug, Error)]
pub enum ContentGenerationError {
    #[error("ai backend unavailable: {0}")]
    Backend(String),
    #[error("ai output unusable: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailSource {
    Search,
    Vision,
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    Ai,
    Template,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub title: String,
    pub description: String,
    pub condition_description: String,
}

#[derive(Debug, Clone)]
pub struct ContentRequest<'a> {
    pub product_details: &'a str,
    pub condition: &'a str,
    pub condition_level: u8,
}

/// Deterministic product summary from search evidence; `Empty` when there is
/// nothing to summarize.
pub fn synthesize_details(evidence: &SearchEvidence) -> Signal<String> {
    if evidence.is_empty() {
        return Signal::Empty;
    }
    let mut lines = Vec::new();

    if let Some(top) = evidence.results.first() {
        lines.push(format!("Title: {}", top.title.trim()));
        if let Some(category) = top.categories.first() {
            lines.push(format!("Category: {}", category.name));
        }
        if let Some(price) = &top.price {
            lines.push(format!("Listed price: {} {}", price.value, price.currency));
        }
    } else if let Some(top) = evidence.sold.first() {
        lines.push(format!("Title: {}", top.title.trim()));
        if let Some(category) = top.categories.first() {
            lines.push(format!("Category: {}", category.name));
        }
    }

    let sold_prices: Vec<f64> = evidence
        .sold
        .iter()
        .filter_map(|item| item.sold_price.as_ref()?.amount())
        .collect();
    if let Some(avg) = mean(&sold_prices) {
        let min = sold_prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = sold_prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        lines.push(format!(
            "Sold comparables: {} (average {}, low {}, high {})",
            sold_prices.len(),
            format_price(avg),
            format_price(min),
            format_price(max),
        ));
    }
    for (idx, item) in evidence.sold.iter().take(MAX_COMPARABLES).enumerate() {
        let price = item
            .sold_price
            .as_ref()
            .map(|p| format!("{} {}", p.value, p.currency))
            .unwrap_or_else(|| "unknown price".into());
        let date = item.sold_date.as_deref().unwrap_or("unknown date");
        lines.push(format!(
            "Comparable {}: {} sold for {} on {}",
            idx + 1,
            item.title.trim(),
            price,
            date
        ));
    }
    Signal::Found(lines.join("\n"))
}

/// Char-safe cut to the marketplace title limit.
pub fn truncate_title(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    title
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

pub fn canned_condition_description(level: u8) -> &'static str {
    match level {
        1 => "Heavily used with significant wear; may need repair or be best suited for parts.",
        2 => "Well used with noticeable wear and cosmetic flaws; fully described in the photos.",
        3 => "Used in good condition with light signs of normal wear.",
        4 => "Lightly used and in excellent condition with minimal signs of wear.",
        5 => "Brand new, unused and in original condition.",
        _ => "Condition level not specified; please refer to the photos for details.",
    }
}

/// Deterministic listing text used whenever the AI backend is absent or fails.
pub fn template_content(request: &ContentRequest<'_>) -> GeneratedContent {
    let title = request
        .product_details
        .lines()
        .find_map(|line| line.trim().strip_prefix("Title:"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(GENERIC_TITLE);
    let condition = request.condition.trim();
    let condition_sentence = if condition.is_empty() {
        "Condition is shown in the photos.".to_string()
    } else {
        format!("This item is in {condition} condition.")
    };
    GeneratedContent {
        title: truncate_title(title),
        description: format!("{}\n\n{}", request.product_details.trim(), condition_sentence),
        condition_description: canned_condition_description(request.condition_level).to_string(),
    }
}

fn strip_markdown_fence(input: &str) -> &str {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.rsplit_once("```").map(|(body, _)| body).unwrap_or(body).trim()
}

pub fn parse_generated(text: &str) -> Result<GeneratedContent, ContentGenerationError> {
    let content: GeneratedContent = serde_json::from_str(strip_markdown_fence(text))
        .map_err(|err| ContentGenerationError::Malformed(err.to_string()))?;
    if content.title.trim().is_empty() || content.description.trim().is_empty() {
        return Err(ContentGenerationError::Malformed(
            "title or description empty".into(),
        ));
    }
    Ok(GeneratedContent {
        title: truncate_title(&content.title),
        description: content.description.trim().to_string(),
        condition_description: content.condition_description.trim().to_string(),
    })
}

/// Produces listing text. The AI path is used only when a gateway is
/// configured; every AI failure degrades to [`template_content`].
#[derive(Clone)]
pub struct ContentEngine {
    llm: Arc<LlmClient>,
}

impl ContentEngine {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Search evidence, else AI photo analysis, else a fixed placeholder.
    pub async fn product_details(
        &self,
        evidence: &SearchEvidence,
        photo: Option<&InlineImage>,
    ) -> (String, DetailSource) {
        if let Signal::Found(details) = synthesize_details(evidence) {
            return (details, DetailSource::Search);
        }
        let analysis = match photo {
            Some(photo) => self.analyze_photo(photo).await,
            None => Signal::Empty,
        };
        match analysis {
            Signal::Found(text) => (text, DetailSource::Vision),
            other => {
                if let Signal::Failed(err) = &other {
                    warn!(target = "snaplist.content", error = %err, "photo_analysis_fallback");
                }
                (ANALYSIS_PLACEHOLDER.to_string(), DetailSource::Placeholder)
            }
        }
    }

    async fn analyze_photo(&self, photo: &InlineImage) -> Signal<String> {
        if !self.llm.is_available() {
            return Signal::Empty;
        }
        let message = LlmMessage {
            role: "user".into(),
            content: MessageContent::Blocks(vec![
                ContentBlock::Text {
                    text: VISION_PROMPT.into(),
                },
                ContentBlock::Image {
                    mime_type: photo.mime_type.clone(),
                    data: photo.data.clone(),
                },
            ]),
        };
        let function = self.llm.config().vision_function.clone();
        match self.llm.chat(&function, &[message]).await {
            Ok(resp) => Signal::Found(resp.text.trim().to_string()),
            Err(err) => Signal::Failed(err.to_string()),
        }
    }

    pub async fn generate(&self, request: &ContentRequest<'_>) -> (GeneratedContent, Generator) {
        if !self.llm.is_available() {
            return (template_content(request), Generator::Template);
        }
        match self.generate_with_ai(request).await {
            Ok(content) => {
                info!(target = "snaplist.content", title = %content.title, "ai_content_generated");
                (content, Generator::Ai)
            }
            Err(err) => {
                warn!(target = "snaplist.content", error = %err, "ai_content_fallback");
                (template_content(request), Generator::Template)
            }
        }
    }

    async fn generate_with_ai(
        &self,
        request: &ContentRequest<'_>,
    ) -> Result<GeneratedContent, ContentGenerationError> {
        let user = serde_json::json!({
            "productDetails": request.product_details,
            "condition": request.condition,
            "conditionLevel": request.condition_level,
        });
        let messages = [
            LlmMessage::text("system", CONTENT_PROMPT.trim()),
            LlmMessage::text("user", user.to_string()),
        ];
        let function = self.llm.config().content_function.clone();
        let response = self
            .llm
            .chat(&function, &messages)
            .await
            .map_err(|err| ContentGenerationError::Backend(err.to_string()))?;
        parse_generated(&response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmConfig;
    use crate::models::{Category, Money, SearchResult, SoldItem};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn evidence() -> SearchEvidence {
        SearchEvidence {
            results: vec![SearchResult {
                item_id: "1".into(),
                title: "Nintendo Switch OLED Console".into(),
                price: Some(Money {
                    value: "250.00".into(),
                    currency: "USD".into(),
                }),
                categories: vec![Category {
                    id: Some("139971".into()),
                    name: "Video Game Consoles".into(),
                }],
                item_specifics: vec![],
            }],
            sold: ["200.00", "220.00", "240.00", "260.00"]
                .iter()
                .enumerate()
                .map(|(i, v)| SoldItem {
                    item_id: format!("s{i}"),
                    title: format!("Switch OLED #{i}"),
                    price: None,
                    sold_price: Some(Money {
                        value: v.to_string(),
                        currency: "USD".into(),
                    }),
                    sold_date: Some("2026-09-01".into()),
                    categories: vec![],
                })
                .collect(),
            keywords: Some("Nintendo Switch OLED".into()),
        }
    }

    fn template_engine() -> ContentEngine {
        ContentEngine::new(Arc::new(LlmClient::new(LlmConfig::disabled())))
    }

    #[test]
    fn details_summarize_sold_statistics() {
        let Signal::Found(details) = synthesize_details(&evidence()) else {
            panic!("expected details");
        };
        assert!(details.starts_with("Title: Nintendo Switch OLED Console\n"));
        assert!(details.contains("Category: Video Game Consoles"));
        assert!(details.contains("Sold comparables: 4 (average 230.00, low 200.00, high 260.00)"));
        assert!(details.contains("Comparable 3:"));
        assert!(!details.contains("Comparable 4:"));
    }

    #[test]
    fn no_evidence_means_empty_details() {
        assert_eq!(synthesize_details(&SearchEvidence::default()), Signal::Empty);
    }

    #[test]
    fn template_uses_title_line_and_canned_condition() {
        let details = "Category: Toys\nTitle: LEGO Star Wars Millennium Falcon 75257\nPrice: 1";
        let content = template_content(&ContentRequest {
            product_details: details,
            condition: "Used - Good",
            condition_level: 3,
        });
        assert_eq!(content.title, "LEGO Star Wars Millennium Falcon 75257");
        assert!(content.description.starts_with(details));
        assert!(content.description.ends_with("This item is in Used - Good condition."));
        assert_eq!(content.condition_description, canned_condition_description(3));
    }

    #[test]
    fn template_without_title_line_uses_generic_label() {
        let content = template_content(&ContentRequest {
            product_details: ANALYSIS_PLACEHOLDER,
            condition: "New",
            condition_level: 9,
        });
        assert_eq!(content.title, GENERIC_TITLE);
        assert_eq!(
            content.condition_description,
            "Condition level not specified; please refer to the photos for details."
        );
    }

    #[test]
    fn titles_are_cut_to_eighty_chars() {
        let long = "é".repeat(120);
        assert_eq!(truncate_title(&long).chars().count(), MAX_TITLE_CHARS);
        let details = format!("Title: {}", "word ".repeat(40));
        let content = template_content(&ContentRequest {
            product_details: &details,
            condition: "New",
            condition_level: 5,
        });
        assert!(content.title.chars().count() <= MAX_TITLE_CHARS);
    }

    #[test]
    fn generated_json_is_unfenced_and_truncated() {
        let text = format!(
            "```json\n{}\n```",
            json!({
                "title": "x".repeat(100),
                "description": "Nice console",
                "conditionDescription": "Light wear"
            })
        );
        let content = parse_generated(&text).expect("parse");
        assert_eq!(content.title.len(), 80);
        assert_eq!(content.condition_description, "Light wear");
        assert!(parse_generated("not json").is_err());
    }

    #[tokio::test]
    async fn no_backend_means_template_and_placeholder() {
        let engine = template_engine();
        let photo = InlineImage {
            mime_type: "image/jpeg".into(),
            data: "aGVsbG8=".into(),
        };
        let (details, source) = engine
            .product_details(&SearchEvidence::default(), Some(&photo))
            .await;
        assert_eq!(details, ANALYSIS_PLACEHOLDER);
        assert_eq!(source, DetailSource::Placeholder);

        let (_, generator) = engine
            .generate(&ContentRequest {
                product_details: &details,
                condition: "New",
                condition_level: 5,
            })
            .await;
        assert_eq!(generator, Generator::Template);
    }

    #[tokio::test]
    async fn ai_paths_and_their_fallbacks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inference"))
            .and(body_partial_json(json!({"function_name": "product_photo_analysis"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "Blue ceramic mug, small chip on rim"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/inference"))
            .and(body_partial_json(json!({"function_name": "listing_content"})))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let engine = ContentEngine::new(Arc::new(LlmClient::new(LlmConfig::for_gateway(
            &server.uri(),
        ))));
        let photo = InlineImage {
            mime_type: "image/jpeg".into(),
            data: "aGVsbG8=".into(),
        };
        let (details, source) = engine
            .product_details(&SearchEvidence::default(), Some(&photo))
            .await;
        assert_eq!(source, DetailSource::Vision);
        assert_eq!(details, "Blue ceramic mug, small chip on rim");

        let (content, generator) = engine
            .generate(&ContentRequest {
                product_details: &details,
                condition: "Used - Acceptable",
                condition_level: 2,
            })
            .await;
        assert_eq!(generator, Generator::Template);
        assert_eq!(content.title, GENERIC_TITLE);
    }

    #[tokio::test]
    async fn ai_content_is_used_and_title_capped() {
        let server = MockServer::start().await;
        let generated = json!({
            "title": format!("Nintendo Switch OLED {}", "with dock and extra joy-con ".repeat(4)),
            "description": "Console with dock, tested and working.",
            "conditionDescription": "Light scuffs on the back."
        });
        Mock::given(method("POST"))
            .and(path("/inference"))
            .and(body_partial_json(json!({"function_name": "listing_content"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": generated.to_string()}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = ContentEngine::new(Arc::new(LlmClient::new(LlmConfig::for_gateway(
            &server.uri(),
        ))));
        let (content, generator) = engine
            .generate(&ContentRequest {
                product_details: "Title: Nintendo Switch OLED Console",
                condition: "Used - Good",
                condition_level: 3,
            })
            .await;
        assert_eq!(generator, Generator::Ai);
        assert_eq!(content.title.chars().count(), MAX_TITLE_CHARS);
        assert!(content.title.starts_with("Nintendo Switch OLED with dock"));
        assert_eq!(content.description, "Console with dock, tested and working.");
        assert_eq!(content.condition_description, "Light scuffs on the back.");
    }
}
