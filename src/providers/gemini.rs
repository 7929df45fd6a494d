//! Gemini (Google) image generation provider client.

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the content was blocked, not merely truncated.
const SAFETY_FINISH_REASONS: [&str; 7] = [
    "SAFETY",
    "IMAGE_SAFETY",
    "IMAGE_PROHIBITED_CONTENT",
    "IMAGE_RECITATION",
    "RECITATION",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
];

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
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
            404 => EaselError::ModelUnavailable(text),
            402 => EaselError::QuotaExhausted(text),
            429 => {
                let retry_after = parse_retry_after(headers).or_else(|| parse_suggested_delay(body));
                if retry_after.is_none() && (lower.contains("quota") || lower.contains("billing")) {
                    EaselError::QuotaExhausted(text)
                } else {
                    EaselError::RateLimited { retry_after }
                }
            }
            400 => {
                if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited")
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
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn generate(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage> {
        let started = Instant::now();

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let body = GeminiRequest::from_request(request)?;

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", credential.expose())
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

        let wire: GeminiResponse = response.json().await.map_err(EaselError::from_transport)?;
        let payload = codec::decode(&wire.into_normalized()?)?;

        Ok(GeneratedImage::new(
            payload,
            GenerationMetadata {
                model: Some(model.to_string()),
                provider: Some(ProviderKind::Gemini),
                duration_ms: Some(started.elapsed().as_millis() as u64),
            },
        ))
    }

    async fn health_check(&self, credential: &Credential) -> Result<()> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", credential.expose())
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
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request, either text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

impl GeminiRequest {
    fn from_request(request: &GenerationRequest) -> Result<Self> {
        let mut parts = Vec::new();

        // Source images first, then the prompt, matching how edits are
        // phrased against the API.
        for image in &request.images {
            let inline = codec::encode_inline(image)?;
            parts.push(GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: inline.mime,
                    data: inline.data,
                },
            });
        }
        parts.push(GeminiRequestPart::Text {
            text: request.prompt.clone(),
        });

        Ok(Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
    #[serde(default)]
    file_data: Option<FileData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    file_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    candidates_tokens_details: Vec<ModalityTokens>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModalityTokens {
    #[serde(default)]
    modality: Option<String>,
    #[serde(default)]
    token_count: Option<u32>,
}

impl GeminiResponse {
    /// Flattens the wire shape into the codec's neutral response.
    ///
    /// An explicit block verdict (prompt feedback or safety finish reason)
    /// takes precedence over any partial content and short-circuits here.
    fn into_normalized(self) -> Result<ProviderResponse> {
        if let Some(feedback) = &self.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                let message = feedback
                    .block_reason_message
                    .clone()
                    .unwrap_or_else(|| format!("prompt blocked: {reason}"));
                return Err(EaselError::ContentRejected(message));
            }
        }

        let image_tokens = self.usage_metadata.as_ref().and_then(|usage| {
            usage
                .candidates_tokens_details
                .iter()
                .find(|d| d.modality.as_deref() == Some("IMAGE"))
                .and_then(|d| d.token_count)
        });

        let mut parts = Vec::new();
        if let Some(candidate) = self.candidates.into_iter().next() {
            if let Some(reason) = &candidate.finish_reason {
                if SAFETY_FINISH_REASONS.contains(&reason.as_str()) {
                    return Err(EaselError::ContentRejected(format!(
                        "content blocked by safety filter: {reason}"
                    )));
                }
            }
            if let Some(content) = candidate.content {
                for part in content.parts {
                    if let Some(inline) = part.inline_data {
                        parts.push(ResponsePart::InlineData {
                            mime: inline.mime_type,
                            data: inline.data,
                        });
                    } else if let Some(file) = part.file_data {
                        parts.push(ResponsePart::ImageUrl(file.file_uri));
                    } else if let Some(text) = part.text {
                        parts.push(ResponsePart::Text(text));
                    }
                }
            }
        }

        Ok(ProviderResponse {
            parts,
            image_tokens,
            blocked: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImagePayload, ImageRef};
    use httpmock::prelude::*;

    #[test]
    fn test_request_construction_basic() {
        let request = GenerationRequest::new("A puppy");
        let wire = GeminiRequest::from_request(&request).unwrap();

        assert_eq!(wire.contents.len(), 1);
        assert_eq!(wire.contents[0].parts.len(), 1);
        assert_eq!(
            wire.generation_config.response_modalities,
            vec!["IMAGE".to_string()]
        );
    }

    #[test]
    fn test_request_construction_with_source_image() {
        let png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let request =
            GenerationRequest::new("Edit this").with_image(ImageRef::new(png, "image/png"));
        let wire = GeminiRequest::from_request(&request).unwrap();

        // Image part first, then the prompt.
        assert_eq!(wire.contents[0].parts.len(), 2);
        assert!(matches!(
            wire.contents[0].parts[0],
            GeminiRequestPart::InlineData { .. }
        ));
    }

    #[test]
    fn test_request_rejects_empty_source_image() {
        let request =
            GenerationRequest::new("Edit this").with_image(ImageRef::new(vec![], "image/png"));
        assert!(matches!(
            GeminiRequest::from_request(&request).unwrap_err(),
            EaselError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let request = GenerationRequest::new("A puppy");
        let wire = GeminiRequest::from_request(&request).unwrap();
        let json = serde_json::to_value(&wire).unwrap();

        assert!(json.get("generationConfig").is_some());
        assert!(json.get("generation_config").is_none());
    }

    #[test]
    fn test_inline_data_response_decodes_to_bytes() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": "image/png",
                            "data": "AQID"
                        }
                    }]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let wire: GeminiResponse = serde_json::from_str(json).unwrap();
        let payload = codec::decode(&wire.into_normalized().unwrap()).unwrap();
        assert_eq!(
            payload,
            ImagePayload::Inline {
                data: vec![1, 2, 3],
                mime: "image/png".into()
            }
        );
    }

    #[test]
    fn test_file_data_response_decodes_to_url() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [{
                        "fileData": {"fileUri": "https://storage.googleapis.com/gen/i.png"}
                    }]
                }
            }]
        }"#;
        let wire: GeminiResponse = serde_json::from_str(json).unwrap();
        let payload = codec::decode(&wire.into_normalized().unwrap()).unwrap();
        assert_eq!(
            payload,
            ImagePayload::Url("https://storage.googleapis.com/gen/i.png".into())
        );
    }

    #[test]
    fn test_prompt_feedback_block_is_content_rejected() {
        let json = r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "Prompt was blocked due to safety"
            }
        }"#;
        let wire: GeminiResponse = serde_json::from_str(json).unwrap();
        match wire.into_normalized().unwrap_err() {
            EaselError::ContentRejected(message) => {
                assert_eq!(message, "Prompt was blocked due to safety")
            }
            other => panic!("expected ContentRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_safety_finish_reason_beats_partial_content() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "I started drawing but"}]},
                "finishReason": "IMAGE_SAFETY"
            }]
        }"#;
        let wire: GeminiResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            wire.into_normalized().unwrap_err(),
            EaselError::ContentRejected(_)
        ));
    }

    #[test]
    fn test_billed_image_tokens_without_image_is_malformed() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "hmm"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "candidatesTokensDetails": [
                    {"modality": "TEXT", "tokenCount": 4},
                    {"modality": "IMAGE", "tokenCount": 1290}
                ]
            }
        }"#;
        let wire: GeminiResponse = serde_json::from_str(json).unwrap();
        let normalized = wire.into_normalized().unwrap();
        assert_eq!(normalized.image_tokens, Some(1290));
        assert!(matches!(
            codec::decode(&normalized).unwrap_err(),
            EaselError::MalformedResponse(_)
        ));
    }

    #[test]
    fn test_classify_429_with_retry_delay_field() {
        let client = GeminiClient::new();
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","details":[{"retryDelay":"54s"}]}}"#;
        let err = client.classify(429, body, &reqwest::header::HeaderMap::new());
        match err {
            EaselError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(54)))
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_429_quota_without_delay_is_quota_exhausted() {
        let client = GeminiClient::new();
        let body = r#"{"error":{"message":"You exceeded your current quota, please check your plan and billing details."}}"#;
        assert!(matches!(
            client.classify(429, body, &reqwest::header::HeaderMap::new()),
            EaselError::QuotaExhausted(_)
        ));
    }

    #[test]
    fn test_classify_status_table() {
        let client = GeminiClient::new();
        let headers = reqwest::header::HeaderMap::new();
        assert!(matches!(
            client.classify(403, "forbidden", &headers),
            EaselError::AccessDenied(_)
        ));
        assert!(matches!(
            client.classify(404, "no such model", &headers),
            EaselError::ModelUnavailable(_)
        ));
        assert!(matches!(
            client.classify(503, "overloaded", &headers),
            EaselError::ModelUnavailable(_)
        ));
        assert!(matches!(
            client.classify(400, "request blocked for safety reasons", &headers),
            EaselError::ContentRejected(_)
        ));
        assert!(matches!(
            client.classify(400, "missing field contents", &headers),
            EaselError::InvalidRequest(_)
        ));
        assert!(matches!(
            client.classify(418, "teapot", &headers),
            EaselError::Api { status: 418, .. }
        ));
    }

    #[tokio::test]
    async fn test_generate_against_mock_server() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.5-flash-image:generateContent")
                    .header("x-goog-api-key", "test-key");
                then.status(200).json_body(serde_json::json!({
                    "candidates": [{
                        "content": {"parts": [
                            {"inlineData": {"mimeType": "image/png", "data": "AQID"}}
                        ]},
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await;

        let client = GeminiClient::new().with_base_url(server.base_url());
        let image = client
            .generate(
                &ModelId::from("gemini-2.5-flash-image"),
                &Credential::from("test-key"),
                &GenerationRequest::new("a red fox"),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(image.bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(
            image.metadata.model.as_deref(),
            Some("gemini-2.5-flash-image")
        );
    }

    #[tokio::test]
    async fn test_generate_classifies_rate_limit_from_mock_server() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.5-flash-image:generateContent");
                then.status(429)
                    .body(r#"{"error":{"details":[{"retryDelay":"3s"}]}}"#);
            })
            .await;

        let client = GeminiClient::new().with_base_url(server.base_url());
        let err = client
            .generate(
                &ModelId::from("gemini-2.5-flash-image"),
                &Credential::from("test-key"),
                &GenerationRequest::new("a red fox"),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.retry_after(),
            Some(std::time::Duration::from_secs(3))
        );
    }
}
