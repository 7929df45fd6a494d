//! OpenRouter image generation provider client.
//!
//! OpenRouter exposes image-capable models through the chat completions
//! surface: the image comes back as a `message.images` entry (usually a
//! data URI), as a markdown image token in `message.content`, or as a bare
//! URL in the text. All of those route through the shared codec.

use crate::backoff::{parse_retry_after, parse_suggested_delay};
use crate::codec::{self, ProviderResponse, ResponsePart};
use crate::credentials::Credential;
use crate::error::{sanitize_error_message, EaselError, Result};
use crate::provider::ProviderClient;
use crate::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ModelId, ProviderKind,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter chat-completions image client.
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenRouterClient {
    /// Creates a client with its own HTTP client.
    pub fn new() -> Self {
        Self::with_http(reqwest::Client::new())
    }

    /// Creates a client over a shared HTTP client.
    pub fn with_http(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Overrides the API base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn classify(&self, status: u16, body: &str, headers: &reqwest::header::HeaderMap) -> EaselError {
        let text = sanitize_error_message(body);
        let lower = text.to_lowercase();
        match status {
            401 => EaselError::AccessDenied(text),
            402 => EaselError::QuotaExhausted(text),
            403 => {
                // OpenRouter reports moderation verdicts as 403.
                if lower.contains("moderation") || lower.contains("flagged") {
                    EaselError::ContentRejected(text)
                } else {
                    EaselError::AccessDenied(text)
                }
            }
            404 => EaselError::ModelUnavailable(text),
            408 => EaselError::ModelUnavailable(text),
            429 => EaselError::RateLimited {
                retry_after: parse_retry_after(headers).or_else(|| parse_suggested_delay(body)),
            },
            500..=599 => EaselError::ModelUnavailable(text),
            _ => EaselError::Api {
                status,
                message: text,
            },
        }
    }
}

impl Default for OpenRouterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for OpenRouterClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    async fn generate(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage> {
        let started = Instant::now();

        let body = ChatRequest::from_request(model, request)?;
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .json(&body)
            .send()
            .await
            .map_err(EaselError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.classify(status.as_u16(), &text, &headers));
        }

        let wire: ChatResponse = response.json().await.map_err(EaselError::from_transport)?;
        let payload = codec::decode(&wire.into_normalized())?;

        Ok(GeneratedImage::new(
            payload,
            GenerationMetadata {
                model: Some(model.to_string()),
                provider: Some(ProviderKind::OpenRouter),
                duration_ms: Some(started.elapsed().as_millis() as u64),
            },
        ))
    }

    async fn health_check(&self, credential: &Credential) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/key", self.base_url))
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .send()
            .await
            .map_err(EaselError::from_transport)?;

        match response.status().as_u16() {
            401 | 403 => Err(EaselError::AccessDenied("invalid API key".into())),
            s if !(200..300).contains(&s) => Err(EaselError::Api {
                status: s,
                message: "health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    modalities: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlRef },
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageUrlRef {
    url: String,
}

impl ChatRequest {
    fn from_request(model: &ModelId, request: &GenerationRequest) -> Result<Self> {
        let mut content = vec![ContentPart::Text {
            text: request.prompt.clone(),
        }];
        for image in &request.images {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrlRef {
                    url: codec::encode_data_url(image)?,
                },
            });
        }
        Ok(Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            modalities: vec!["image".to_string(), "text".to_string()],
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    images: Option<Vec<MessageImage>>,
}

#[derive(Debug, Deserialize)]
struct MessageImage {
    image_url: ImageUrlRef,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens_details: Option<TokenDetails>,
}

#[derive(Debug, Deserialize)]
struct TokenDetails {
    #[serde(default)]
    image_tokens: Option<u32>,
}

impl ChatResponse {
    fn into_normalized(self) -> ProviderResponse {
        let image_tokens = self
            .usage
            .as_ref()
            .and_then(|u| u.completion_tokens_details.as_ref())
            .and_then(|d| d.image_tokens);

        let mut parts = Vec::new();
        let mut blocked = None;
        if let Some(choice) = self.choices.into_iter().next() {
            if choice.finish_reason.as_deref() == Some("content_filter") {
                blocked = Some("content filtered by the model".to_string());
            }
            if let Some(images) = choice.message.images {
                for image in images {
                    parts.push(ResponsePart::ImageUrl(image.image_url.url));
                }
            }
            if let Some(content) = choice.message.content {
                if !content.is_empty() {
                    parts.push(ResponsePart::Text(content));
                }
            }
        }

        ProviderResponse {
            parts,
            image_tokens,
            blocked,
        }
    }
}
