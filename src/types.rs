//! Core types for generation requests and results.

use crate::error::{EaselError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// The user action that produced a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Text-to-image generation.
    #[default]
    Generate,
    /// Whole-image editing guided by a prompt.
    Edit,
    /// Masked in-place editing; the mask arrives as an extra source image.
    Inpaint,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Edit => write!(f, "edit"),
            Self::Inpaint => write!(f, "inpaint"),
        }
    }
}

/// An external generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini image models.
    Gemini,
    /// OpenAI image models (GPT Image, DALL-E).
    OpenAi,
    /// OpenRouter-hosted image-capable chat models.
    OpenRouter,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
            Self::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// Opaque identifier of a model offered by a provider.
///
/// Model lists are injected configuration, so this stays a string rather
/// than an enum of known variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Wraps a model identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An in-memory source image with its declared MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Declared MIME type (e.g. `image/png`).
    pub mime: String,
}

impl ImageRef {
    /// Creates an image reference with an explicit MIME type.
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
        }
    }

    /// Creates an image reference, detecting the MIME type from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| EaselError::InvalidRequest("unrecognized image data".into()))?;
        Ok(Self {
            data,
            mime: format.mime_type().to_string(),
        })
    }
}

/// A request to generate or edit an image.
///
/// Immutable once created; every user action builds a fresh request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The user action behind this request.
    pub feature: Feature,
    /// The text prompt describing the desired result.
    pub prompt: String,
    /// Source images, in order (empty for pure generation).
    pub images: Vec<ImageRef>,
    /// The provider this request prefers.
    pub provider: ProviderKind,
}

impl GenerationRequest {
    /// Creates a new generation request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            feature: Feature::Generate,
            prompt: prompt.into(),
            images: Vec::new(),
            provider: ProviderKind::Gemini,
        }
    }

    /// Sets the feature this request belongs to.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = feature;
        self
    }

    /// Appends a source image.
    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.images.push(image);
        self
    }

    /// Sets the preferred provider.
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// Returns true if this request carries source images.
    pub fn is_edit(&self) -> bool {
        !self.images.is_empty()
    }
}

/// The normalized image content of a successful generation.
///
/// Exactly one form is ever populated, which the enum enforces.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePayload {
    /// Inline image bytes with their MIME type.
    Inline {
        /// Raw image bytes.
        data: Vec<u8>,
        /// MIME type of the bytes.
        mime: String,
    },
    /// A dereferenceable URL hosting the image.
    Url(String),
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationMetadata {
    /// Model that produced the image.
    pub model: Option<String>,
    /// Provider that produced the image.
    pub provider: Option<ProviderKind>,
    /// Wall-clock duration of the successful attempt in milliseconds.
    pub duration_ms: Option<u64>,
}

/// A generated image in normalized form.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "generated image should be saved or processed"]
pub struct GeneratedImage {
    /// The image content.
    pub payload: ImagePayload,
    /// Generation metadata.
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Creates a generated image from a payload and metadata.
    pub fn new(payload: ImagePayload, metadata: GenerationMetadata) -> Self {
        Self { payload, metadata }
    }

    /// Returns the inline bytes, if this image is inline.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            ImagePayload::Inline { data, .. } => Some(data),
            ImagePayload::Url(_) => None,
        }
    }

    /// Returns the URL, if this image is hosted.
    pub fn url(&self) -> Option<&str> {
        match &self.payload {
            ImagePayload::Inline { .. } => None,
            ImagePayload::Url(url) => Some(url),
        }
    }

    /// Returns the size of the inline data in bytes, or 0 for a URL result.
    pub fn size(&self) -> usize {
        self.bytes().map(<[u8]>::len).unwrap_or(0)
    }

    /// Saves inline image bytes to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        match &self.payload {
            ImagePayload::Inline { data, .. } => {
                std::fs::write(path, data)?;
                Ok(())
            }
            ImagePayload::Url(url) => Err(EaselError::InvalidRequest(format!(
                "image is hosted at {url}; download it before saving"
            ))),
        }
    }

    /// Returns inline image data as a data URL.
    pub fn to_data_url(&self) -> Option<String> {
        match &self.payload {
            ImagePayload::Inline { data, mime } => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                Some(format!("data:{mime};base64,{encoded}"))
            }
            ImagePayload::Url(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"not an image"), None);
    }

    #[test]
    fn test_image_ref_from_bytes() {
        let image = ImageRef::from_bytes(PNG_MAGIC.to_vec()).unwrap();
        assert_eq!(image.mime, "image/png");

        let err = ImageRef::from_bytes(b"garbage".to_vec()).unwrap_err();
        assert!(matches!(err, EaselError::InvalidRequest(_)));
    }

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("a red fox")
            .with_feature(Feature::Inpaint)
            .with_provider(ProviderKind::OpenAi)
            .with_image(ImageRef::new(PNG_MAGIC.to_vec(), "image/png"));

        assert_eq!(request.feature, Feature::Inpaint);
        assert_eq!(request.provider, ProviderKind::OpenAi);
        assert_eq!(request.images.len(), 1);
        assert!(request.is_edit());
    }

    #[test]
    fn test_request_without_images_is_not_edit() {
        assert!(!GenerationRequest::new("a red fox").is_edit());
    }

    #[test]
    fn test_generated_image_accessors() {
        let inline = GeneratedImage::new(
            ImagePayload::Inline {
                data: vec![1, 2, 3],
                mime: "image/png".into(),
            },
            GenerationMetadata::default(),
        );
        assert_eq!(inline.bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(inline.url(), None);
        assert_eq!(inline.size(), 3);
        assert_eq!(
            inline.to_data_url().as_deref(),
            Some("data:image/png;base64,AQID")
        );

        let hosted = GeneratedImage::new(
            ImagePayload::Url("https://cdn.example/img.png".into()),
            GenerationMetadata::default(),
        );
        assert_eq!(hosted.bytes(), None);
        assert_eq!(hosted.url(), Some("https://cdn.example/img.png"));
        assert_eq!(hosted.size(), 0);
        assert!(hosted.to_data_url().is_none());
    }

    #[test]
    fn test_save_rejects_hosted_images() {
        let hosted = GeneratedImage::new(
            ImagePayload::Url("https://cdn.example/img.png".into()),
            GenerationMetadata::default(),
        );
        assert!(hosted.save("/tmp/never-written.png").is_err());
    }

    #[test]
    fn test_provider_kind_display_and_serde() {
        assert_eq!(ProviderKind::Gemini.to_string(), "gemini");
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
        assert_eq!(
            serde_json::from_str::<ProviderKind>("\"openrouter\"").unwrap(),
            ProviderKind::OpenRouter
        );
    }

    #[test]
    fn test_model_id_is_opaque() {
        let model = ModelId::from("gemini-2.5-flash-image");
        assert_eq!(model.as_str(), "gemini-2.5-flash-image");
        assert_eq!(model.to_string(), "gemini-2.5-flash-image");
    }
}
