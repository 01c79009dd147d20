use crate::http::{build_client, env_opt, env_usize};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Submitted when every inline upload failed and nothing else is left.
pub const PLACEHOLDER_IMAGE_URL: &str = "https://i.ebayimg.com/images/g/placeholder/s-l1600.jpg";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageRefError {
    #[error("image reference is empty")]
    Empty,
    #[error("unsupported image reference: {0}")]
    Unsupported(String),
    #[error("image payload is not valid base64")]
    BadEncoding,
}

#[derive(Debug, Error)]
pub enum ImageHostError {
    #[error("image host is not configured")]
    NotConfigured,
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("download failed: {0}")]
    Download(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Standard base64, no `data:` prefix.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Inline(InlineImage),
    Remote(String),
}

impl ImageRef {
    /// Accepts `data:<mime>;base64,<payload>`, bare base64 (assumed JPEG), or an
    /// http(s) URL.
    pub fn parse(raw: &str) -> Result<Self, ImageRefError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImageRefError::Empty);
        }
        if let Some(rest) = raw.strip_prefix("data:") {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| ImageRefError::Unsupported(preview(raw)))?;
            let mime_type = meta
                .strip_suffix(";base64")
                .filter(|m| m.starts_with("image/"))
                .ok_or_else(|| ImageRefError::Unsupported(preview(raw)))?;
            return inline(mime_type, payload);
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return reqwest::Url::parse(raw)
                .map(|url| ImageRef::Remote(url.to_string()))
                .map_err(|_| ImageRefError::Unsupported(preview(raw)));
        }
        inline("image/jpeg", raw)
    }
}

fn inline(mime_type: &str, payload: &str) -> Result<ImageRef, ImageRefError> {
    let payload = payload.trim();
    if payload.is_empty() || BASE64.decode(payload).is_err() {
        return Err(ImageRefError::BadEncoding);
    }
    Ok(ImageRef::Inline(InlineImage {
        mime_type: mime_type.to_string(),
        data: payload.to_string(),
    }))
}

fn preview(raw: &str) -> String {
    raw.chars().take(32).collect()
}

#[derive(Debug, Clone)]
pub struct ImageHostConfig {
    pub upload_url: Option<String>,
    pub api_key: Option<String>,
    pub concurrency: usize,
}

impl ImageHostConfig {
    pub fn from_env() -> Self {
        Self {
            upload_url: env_opt("IMAGE_HOST_URL"),
            api_key: env_opt("IMAGE_HOST_KEY"),
            concurrency: env_usize("IMAGE_UPLOAD_CONCURRENCY", 3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedImages {
    pub urls: Vec<String>,
    pub failed: usize,
    pub placeholder_used: bool,
}

#[derive(Deserialize)]
struct UploadResponse {
    data: UploadedImage,
}

#[derive(Deserialize)]
struct UploadedImage {
    url: String,
}

/// Client for an imgbb-style host: form POST of `key` + base64 `image`,
/// answer `{"data":{"url":...}}`.
#[derive(Clone)]
pub struct ImageHostClient {
    http: Client,
    config: ImageHostConfig,
}

impl ImageHostClient {
    pub fn new(config: ImageHostConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub async fn upload(&self, image: &InlineImage) -> Result<String, ImageHostError> {
        let url = self
            .config
            .upload_url
            .as_deref()
            .ok_or(ImageHostError::NotConfigured)?;
        let key = self.config.api_key.clone().unwrap_or_default();
        let response = self
            .http
            .post(url)
            .form(&[("key", key.as_str()), ("image", image.data.as_str())])
            .send()
            .await
            .map_err(|err| ImageHostError::Upload(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ImageHostError::Upload(format!("HTTP {}", response.status())));
        }
        let payload: UploadResponse = response
            .json()
            .await
            .map_err(|err| ImageHostError::Upload(err.to_string()))?;
        Ok(payload.data.url)
    }

    /// Resolves every reference to a public URL, preserving order. Remote URLs
    /// pass through, inline images upload with bounded concurrency, and failed
    /// uploads are dropped.
    pub async fn host_all(&self, refs: &[String]) -> HostedImages {
        let concurrency = self.config.concurrency.max(1);
        let results: Vec<Option<String>> = stream::iter(refs.to_vec().into_iter().enumerate())
            .map(|(idx, raw)| {
                let host = self.clone();
                async move { host.resolve(idx, &raw).await }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_none()).count();
        let mut urls: Vec<String> = results.into_iter().flatten().collect();
        let placeholder_used = urls.is_empty();
        if placeholder_used {
            warn!(target = "snaplist.images", failed, "all_uploads_failed_using_placeholder");
            urls.push(PLACEHOLDER_IMAGE_URL.to_string());
        }
        HostedImages {
            urls,
            failed,
            placeholder_used,
        }
    }

    async fn resolve(&self, idx: usize, raw: &str) -> Option<String> {
        match ImageRef::parse(raw) {
            Ok(ImageRef::Remote(url)) => Some(url),
            Ok(ImageRef::Inline(image)) => match self.upload(&image).await {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!(target = "snaplist.images", index = idx, error = %err, "image_upload_failed");
                    None
                }
            },
            Err(err) => {
                warn!(target = "snaplist.images", index = idx, error = %err, "image_reference_invalid");
                None
            }
        }
    }

    /// Fetches a remote photo so it can be fed to image search or vision.
    pub async fn download(&self, url: &str) -> Result<InlineImage, ImageHostError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ImageHostError::Download(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ImageHostError::Download(format!("HTTP {}", response.status())));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ImageHostError::Download(err.to_string()))?;
        Ok(InlineImage {
            mime_type,
            data: BASE64.encode(bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host_for(server: &MockServer) -> ImageHostClient {
        ImageHostClient::new(ImageHostConfig {
            upload_url: Some(format!("{}/upload", server.uri())),
            api_key: Some("k".into()),
            concurrency: 2,
        })
    }

    #[test]
    fn parses_supported_reference_forms() {
        assert_eq!(
            ImageRef::parse("data:image/png;base64,aGVsbG8="),
            Ok(ImageRef::Inline(InlineImage {
                mime_type: "image/png".into(),
                data: "aGVsbG8=".into(),
            }))
        );
        assert!(matches!(
            ImageRef::parse("https://cdn.example.com/a.jpg"),
            Ok(ImageRef::Remote(_))
        ));
        assert!(matches!(ImageRef::parse("aGVsbG8="), Ok(ImageRef::Inline(_))));
        assert_eq!(ImageRef::parse("  "), Err(ImageRefError::Empty));
        assert_eq!(ImageRef::parse("not base64 !!"), Err(ImageRefError::BadEncoding));
        assert!(matches!(
            ImageRef::parse("data:text/plain;base64,aGVsbG8="),
            Err(ImageRefError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn failed_uploads_are_dropped_and_order_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(body_string_contains("aGVsbG8%3D"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"url": "https://img.example/hello.jpg"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(body_string_contains("Ynll"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let hosted = host_for(&server)
            .host_all(&[
                "https://cdn.example/first.jpg".into(),
                "data:image/jpeg;base64,aGVsbG8=".into(),
                "data:image/jpeg;base64,Ynll".into(),
            ])
            .await;
        assert_eq!(
            hosted.urls,
            vec!["https://cdn.example/first.jpg", "https://img.example/hello.jpg"]
        );
        assert_eq!(hosted.failed, 1);
        assert!(!hosted.placeholder_used);
    }

    #[tokio::test]
    async fn all_failures_fall_back_to_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let hosted = host_for(&server)
            .host_all(&[
                "data:image/jpeg;base64,aGVsbG8=".into(),
                "data:image/jpeg;base64,Ynll".into(),
            ])
            .await;
        assert_eq!(hosted.urls, vec![PLACEHOLDER_IMAGE_URL.to_string()]);
        assert_eq!(hosted.failed, 2);
        assert!(hosted.placeholder_used);
    }
}
