//! OpenAI image generation provider client (gpt-image-1, dall-e-3).

use crate::backoff::parse_retry_after;
use crate::codec::{self, ProviderResponse, ResponsePart};
use crate::credentials::Credential;
use crate::error::{sanitize_error_message, EaselError, Result};
use crate::provider::ProviderClient;
use crate::types::{
    GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ModelId, ProviderKind,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI images client covering the generations and edits endpoints.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
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
            401 | 403 => EaselError::AccessDenied(text),
            402 => EaselError::QuotaExhausted(text),
            404 => EaselError::ModelUnavailable(text),
            413 => EaselError::InvalidRequest(
                "image too large, reduce image size and try again".into(),
            ),
            429 => {
                // 429 covers both transient rate limits and a spent quota;
                // only the former is worth waiting out.
                if lower.contains("insufficient_quota")
                    || lower.contains("exceeded your current quota")
                {
                    EaselError::QuotaExhausted(text)
                } else {
                    EaselError::RateLimited {
                        retry_after: parse_retry_after(headers),
                    }
                }
            }
            400 => {
                if lower.contains("safety")
                    || lower.contains("content_policy")
                    || lower.contains("moderation_blocked")
                {
                    EaselError::ContentRejected(text)
                } else {
                    EaselError::InvalidRequest(text)
                }
            }
            500..=599 => EaselError::ModelUnavailable(text),
            _ => EaselError::Api {
                status,
                message: text,
            },
        }
    }

    async fn generate_image(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<ProviderResponse> {
        let body = OpenAiImageRequest {
            model: model.to_string(),
            prompt: request.prompt.clone(),
            n: 1,
        };

        let response = self
            .http
            .post(format!("{}/images/generations", self.base_url))
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

        let wire: OpenAiImageResponse = response.json().await.map_err(EaselError::from_transport)?;
        Ok(wire.into_normalized())
    }

    /// Edits go through the multipart endpoint; every source image becomes
    /// an `image[]` part.
    async fn generate_edit(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<ProviderResponse> {
        let mut form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .text("prompt", request.prompt.clone())
            .text("n", "1");

        for image in &request.images {
            // Validate up front so unreadable input fails fast instead of
            // round-tripping to the API.
            let inline = codec::encode_inline(image)?;
            let extension = ImageFormat::from_magic_bytes(&image.data)
                .map(|f| f.extension())
                .unwrap_or("png");
            let part = reqwest::multipart::Part::bytes(image.data.clone())
                .file_name(format!("image.{extension}"))
                .mime_str(&inline.mime)
                .map_err(|e| EaselError::InvalidRequest(e.to_string()))?;
            form = form.part("image[]", part);
        }

        let response = self
            .http
            .post(format!("{}/images/edits", self.base_url))
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .multipart(form)
            .send()
            .await
            .map_err(EaselError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.classify(status.as_u16(), &text, &headers));
        }

        let wire: OpenAiImageResponse = response.json().await.map_err(EaselError::from_transport)?;
        Ok(wire.into_normalized())
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage> {
        let started = Instant::now();

        let normalized = if request.is_edit() {
            self.generate_edit(model, credential, request).await?
        } else {
            self.generate_image(model, credential, request).await?
        };
        let payload = codec::decode(&normalized)?;

        Ok(GeneratedImage::new(
            payload,
            GenerationMetadata {
                model: Some(model.to_string()),
                provider: Some(ProviderKind::OpenAi),
                duration_ms: Some(started.elapsed().as_millis() as u64),
            },
        ))
    }

    async fn health_check(&self, credential: &Credential) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
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
struct OpenAiImageRequest {
    model: String,
    prompt: String,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    #[serde(default)]
    data: Vec<OpenAiImageData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl OpenAiImageResponse {
    fn into_normalized(self) -> ProviderResponse {
        let mut parts = Vec::new();
        for item in self.data {
            if let Some(b64) = item.b64_json {
                // The MIME type is not declared on the wire; the codec
                // detects it from magic bytes.
                parts.push(ResponsePart::InlineData {
                    mime: String::new(),
                    data: b64,
                });
            } else if let Some(url) = item.url {
                parts.push(ResponsePart::ImageUrl(url));
            }
        }
        ProviderResponse {
            parts,
            image_tokens: None,
            blocked: None,
        }
    }
}
