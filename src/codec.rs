//! Wire codec: outbound image encoding and inbound response normalization.
//!
//! Providers return image data in at least four incompatible shapes: inline
//! base64 parts, structured URL fields, markdown image tokens inside text,
//! and bare URLs inside text. Each provider client parses its own wire JSON
//! into a neutral [`ProviderResponse`]; [`decode`] then applies one ordered,
//! short-circuiting decision list so every provider shares a single
//! normalization path.

use crate::error::{sanitize_error_message, EaselError, Result};
use crate::types::{ImageFormat, ImagePayload, ImageRef};
use base64::Engine;

/// Bare URLs in prose are only accepted when the surrounding text is shorter
/// than this; longer text is treated as prose, not an image reference.
const SHORT_TEXT_THRESHOLD: usize = 500;

/// File extensions that mark a bare URL as an image.
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// Hosts that serve generated images from object storage; a bare URL on one
/// of these is accepted regardless of extension.
const OBJECT_STORE_HOSTS: [&str; 7] = [
    "storage.googleapis.com",
    "googleusercontent.com",
    "amazonaws.com",
    "blob.core.windows.net",
    "r2.cloudflarestorage.com",
    "digitaloceanspaces.com",
    "backblazeb2.com",
];

/// One content part of a provider response, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    /// Inline base64 image data with its MIME type.
    InlineData {
        /// MIME type of the encoded bytes (may be empty if the provider
        /// did not declare one).
        mime: String,
        /// Base64-encoded image bytes.
        data: String,
    },
    /// A structured field holding an image URL (or data URI).
    ImageUrl(String),
    /// Plain text returned by the model.
    Text(String),
}

/// A provider response reduced to the parts the codec understands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    /// Content parts in the order the provider returned them.
    pub parts: Vec<ResponsePart>,
    /// Image output tokens the provider billed, if it reported usage.
    pub image_tokens: Option<u32>,
    /// Moderation/block indicator, if the provider surfaced one.
    pub blocked: Option<String>,
}

/// An outbound inline image payload: MIME type plus base64 data.
#[derive(Debug, Clone, PartialEq)]
pub struct InlinePayload {
    /// MIME type of the encoded bytes.
    pub mime: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

/// Encodes a source image as an inline base64 payload.
///
/// The only failure mode is unreadable input (empty bytes, or no declared
/// MIME type and unrecognizable magic bytes); that fails fast and is never
/// retried.
pub fn encode_inline(image: &ImageRef) -> Result<InlinePayload> {
    if image.data.is_empty() {
        return Err(EaselError::InvalidRequest("source image is empty".into()));
    }
    let mime = if image.mime.is_empty() {
        ImageFormat::from_magic_bytes(&image.data)
            .map(|f| f.mime_type().to_string())
            .ok_or_else(|| {
                EaselError::InvalidRequest("source image has no recognizable format".into())
            })?
    } else {
        image.mime.clone()
    };
    let data = base64::engine::general_purpose::STANDARD.encode(&image.data);
    Ok(InlinePayload { mime, data })
}

/// Encodes a source image as a `data:` URI.
pub fn encode_data_url(image: &ImageRef) -> Result<String> {
    let inline = encode_inline(image)?;
    Ok(format!("data:{};base64,{}", inline.mime, inline.data))
}

/// Decodes a normalized provider response into an image payload.
///
/// Pure function; the decision list below runs in order and short-circuits:
/// 1. first inline-data part;
/// 2. first image-URL part (`data:` URIs are inlined);
/// 3. markdown image token `![...](URL)` inside the returned text;
/// 4. bare URL inside the text, accepted only with an image extension, a
///    known object-storage host, or short surrounding text;
/// 5. image tokens billed but nothing extracted is a hard error, not a
///    silent empty success;
/// 6. block indicator with no content;
/// 7. otherwise malformed, preserving the trailing text for diagnostics.
pub fn decode(response: &ProviderResponse) -> Result<ImagePayload> {
    // 1. Inline binary part.
    for part in &response.parts {
        if let ResponsePart::InlineData { mime, data } = part {
            return decode_inline(mime, data);
        }
    }

    // 2. Structured image URL field.
    for part in &response.parts {
        if let ResponsePart::ImageUrl(url) = part {
            return url_to_payload(url);
        }
    }

    // 3./4. URLs embedded in returned text.
    let text = joined_text(response);
    if let Some(url) = extract_markdown_image(&text) {
        return url_to_payload(&url);
    }
    if let Some(url) = extract_bare_url(&text) {
        return url_to_payload(&url);
    }

    // 5. The provider billed image output but we recognized none of it.
    if response.image_tokens.unwrap_or(0) > 0 {
        return Err(EaselError::MalformedResponse(
            "provider billed image tokens but no image was found in the response".into(),
        ));
    }

    // 6. Nothing extracted and the provider flagged a block.
    if let Some(reason) = &response.blocked {
        return Err(EaselError::ContentRejected(reason.clone()));
    }

    // 7. No image in any recognized shape.
    if text.is_empty() {
        Err(EaselError::MalformedResponse(
            "response contained no image and no text".into(),
        ))
    } else {
        Err(EaselError::MalformedResponse(format!(
            "response contained no image, only text: {}",
            sanitize_error_message(&text)
        )))
    }
}

fn decode_inline(mime: &str, data: &str) -> Result<ImagePayload> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| EaselError::Decode(e.to_string()))?;
    let mime = if mime.is_empty() {
        ImageFormat::from_magic_bytes(&bytes)
            .map(|f| f.mime_type().to_string())
            .unwrap_or_else(|| "image/png".to_string())
    } else {
        mime.to_string()
    };
    Ok(ImagePayload::Inline { data: bytes, mime })
}

/// Routes a URL candidate to the right payload form: `data:` URIs become
/// inline bytes, everything else stays a URL.
fn url_to_payload(url: &str) -> Result<ImagePayload> {
    if let Some(rest) = url.strip_prefix("data:") {
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| EaselError::Decode("malformed data URI".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| EaselError::Decode("data URI is not base64-encoded".into()))?;
        return decode_inline(mime, data);
    }
    Ok(ImagePayload::Url(url.to_string()))
}

fn joined_text(response: &ProviderResponse) -> String {
    let mut text = String::new();
    for part in &response.parts {
        if let ResponsePart::Text(t) = part {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(t);
        }
    }
    text
}

/// Extracts the URL of the first markdown image token `![...](URL)`.
fn extract_markdown_image(text: &str) -> Option<String> {
    let start = text.find("![")?;
    let rest = &text[start..];
    let open = rest.find("](")?;
    let after = &rest[open + 2..];
    let close = after.find(')')?;
    let url = after[..close].trim();
    if url.is_empty() {
        return None;
    }
    Some(url.to_string())
}

/// Extracts the first bare URL the heuristics accept as an image.
fn extract_bare_url(text: &str) -> Option<String> {
    let start = text
        .find("https://")
        .or_else(|| text.find("http://"))?;
    let candidate = &text[start..];
    let end = candidate
        .find(|c: char| c.is_whitespace() || c == ')' || c == '"' || c == '\'' || c == '<')
        .unwrap_or(candidate.len());
    let url = candidate[..end].trim_end_matches(['.', ',', ';', ':', '!', '?']);
    if url.len() <= "https://".len() {
        return None;
    }

    if has_image_extension(url) || is_object_store_host(url) || text.len() < SHORT_TEXT_THRESHOLD {
        Some(url.to_string())
    } else {
        None
    }
}

fn has_image_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

fn is_object_store_host(url: &str) -> bool {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or("");
    OBJECT_STORE_HOSTS
        .iter()
        .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
}
