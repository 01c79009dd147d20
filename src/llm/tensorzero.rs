use crate::http::{build_client, env_opt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `None` means no AI backend is deployed; callers pick deterministic paths.
    pub gateway_url: Option<String>,
    pub api_key: Option<String>,
    pub content_function: String,
    pub vision_function: String,
    pub model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            gateway_url: env_opt("TENSORZERO_GATEWAY_URL"),
            api_key: env_opt("TENSORZERO_API_KEY"),
            content_function: env_opt("TENSORZERO_CONTENT_FUNCTION")
                .unwrap_or_else(|| "listing_content".into()),
            vision_function: env_opt("TENSORZERO_VISION_FUNCTION")
                .unwrap_or_else(|| "product_photo_analysis".into()),
            model: env_opt("TENSORZERO_MODEL"),
        }
    }

    pub fn disabled() -> Self {
        Self {
            gateway_url: None,
            api_key: None,
            content_function: "listing_content".into(),
            vision_function: "product_photo_analysis".into(),
            model: None,
        }
    }

    pub fn for_gateway(url: &str) -> Self {
        Self {
            gateway_url: Some(url.trim_end_matches('/').to_string()),
            ..Self::disabled()
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing gateway url")]
    MissingGateway,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: MessageContent,
}

impl LlmMessage {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: MessageContent::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { mime_type: String, data: String },
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub usage: Option<LlmUsage>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.config.gateway_url.is_some()
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub async fn chat(
        &self,
        function_name: &str,
        messages: &[LlmMessage],
    ) -> Result<LlmResponse, LlmError> {
        let gateway = self
            .config
            .gateway_url
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .ok_or(LlmError::MissingGateway)?;

        let body = ChatRequest {
            function_name,
            model_name: self.config.model.as_deref(),
            input: ChatInput { messages },
        };

        let mut request = self.http.post(format!("{gateway}/inference")).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: TensorZeroResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        let text = payload
            .content
            .into_iter()
            .find(|item| item.r#type == "text")
            .and_then(|item| item.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("missing text".into()))?;

        Ok(LlmResponse {
            text,
            usage: payload.usage,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    function_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<&'a str>,
    input: ChatInput<'a>,
}

#[derive(Debug, Serialize)]
struct ChatInput<'a> {
    messages: &'a [LlmMessage],
}

#[derive(Debug, Deserialize)]
struct TensorZeroResponse {
    content: Vec<ResponseContent>,
    #[serde(default)]
    usage: Option<LlmUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
}
