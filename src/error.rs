//! Error types and failure classification.

use std::fmt;
use std::time::Duration;

/// Closed classification of a failed generation attempt.
///
/// Every raw provider error is mapped onto exactly one kind at the provider
/// client boundary; all retry/fallback branching above that boundary happens
/// on this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transient rate limit; retry the same model after a backoff wait.
    RateLimited,
    /// The credential's quota is spent; rotate to the next credential.
    QuotaExhausted,
    /// The credential cannot use this model; fall back to the next model.
    AccessDenied,
    /// The model is unreachable or timing out; fall back to the next model.
    ModelUnavailable,
    /// The provider refused the content. Never retried.
    ContentRejected,
    /// The provider replied in a shape we could not extract an image from.
    /// Never retried.
    MalformedResponse,
    /// Anything else. Never retried.
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RateLimited => "rate-limited",
            Self::QuotaExhausted => "quota-exhausted",
            Self::AccessDenied => "access-denied",
            Self::ModelUnavailable => "model-unavailable",
            Self::ContentRejected => "content-rejected",
            Self::MalformedResponse => "malformed-response",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Errors that can occur while orchestrating a generation request.
#[derive(Debug, thiserror::Error)]
pub enum EaselError {
    /// Rate limit exceeded, possibly with a server-suggested wait.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Wait suggested by the provider, if it sent one.
        retry_after: Option<Duration>,
    },

    /// The credential's quota or credit balance is spent.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Authentication or authorization failed for this model.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The model is unavailable, unknown, or timing out.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Content was blocked by the provider's safety filters.
    #[error("content blocked: {0}")]
    ContentRejected(String),

    /// The provider response had no recognizable image in it.
    #[error("unexpected response: {0}")]
    MalformedResponse(String),

    /// Failed to decode base64 or data-URI payloads.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// Invalid request input (e.g. unreadable source image).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or transport error that is not a timeout.
    #[error("network error: {0}")]
    Network(String),

    /// Provider returned an error that fits no specific class.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },

    /// The computed backoff wait exceeded the configured ceiling; the call
    /// failed fast instead of hanging.
    #[error("provider under high traffic, try again later (suggested wait {suggested:?})")]
    HighTraffic {
        /// The wait the policy refused to serve.
        suggested: Duration,
    },

    /// Every credential in the pool was exhausted.
    #[error("all credentials exhausted: {detail}")]
    Exhausted {
        /// Classification of the last attempt's failure.
        kind: FailureKind,
        /// Human-readable summary of the last failure.
        detail: String,
    },

    /// Configuration error (unknown provider, empty pool or chain).
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (e.g. saving an image to disk).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EaselError {
    /// Maps this error onto the closed [`FailureKind`] set.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } | Self::HighTraffic { .. } => FailureKind::RateLimited,
            Self::QuotaExhausted(_) => FailureKind::QuotaExhausted,
            Self::AccessDenied(_) => FailureKind::AccessDenied,
            Self::ModelUnavailable(_) => FailureKind::ModelUnavailable,
            Self::ContentRejected(_) => FailureKind::ContentRejected,
            Self::MalformedResponse(_) | Self::Decode(_) | Self::Json(_) => {
                FailureKind::MalformedResponse
            }
            Self::Exhausted { kind, .. } => *kind,
            Self::InvalidRequest(_)
            | Self::Network(_)
            | Self::Api { .. }
            | Self::Config(_)
            | Self::Io(_) => FailureKind::Unknown,
        }
    }

    /// True if the same model/credential is worth retrying after a wait.
    pub fn retries_in_place(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// True if the credential pool should advance to its next entry.
    pub fn rotates_credential(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::QuotaExhausted(_))
    }

    /// True if the model chain should advance to its next entry.
    pub fn advances_model(&self) -> bool {
        matches!(self, Self::AccessDenied(_) | Self::ModelUnavailable(_))
    }

    /// True if any retry or fallback path can recover from this error.
    pub fn is_retryable(&self) -> bool {
        self.rotates_credential() || self.advances_model()
    }

    /// The provider-suggested wait, if this error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classifies a transport-level failure. Timeouts count as the model
    /// being unavailable, which triggers model fallback rather than a
    /// same-model retry.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::ModelUnavailable("request timed out".into())
        } else if err.is_connect() {
            Self::ModelUnavailable(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::MalformedResponse(format!("response body was not valid JSON: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type alias for generation operations.
pub type Result<T> = std::result::Result<T, EaselError>;

const MAX_ERROR_LEN: usize = 500;

/// Strips secrets from provider error text and bounds its length before it
/// travels up into logs or user-facing messages.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let mut out = redact_key_params(text.trim());
    if out.len() > MAX_ERROR_LEN {
        let mut cut = MAX_ERROR_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("...");
    }
    out
}

/// Replaces the value of `key=`/`api_key=`/`token=` query parameters, which
/// some providers echo back in error bodies.
fn redact_key_params(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(after_eq) = find_key_param(rest) {
        out.push_str(&rest[..after_eq]);
        out.push_str("REDACTED");
        let value_end = rest[after_eq..]
            .find(|c: char| c == '&' || c == '"' || c == '\'' || c.is_whitespace())
            .map(|i| after_eq + i)
            .unwrap_or(rest.len());
        rest = &rest[value_end..];
    }
    out.push_str(rest);
    out
}

/// Returns the index just past the `=` of the next secret-bearing query
/// parameter, if any.
fn find_key_param(text: &str) -> Option<usize> {
    const PARAMS: [&str; 3] = ["key=", "api_key=", "token="];
    let lower = text.to_lowercase();
    PARAMS
        .iter()
        .filter_map(|p| lower.find(p).map(|i| i + p.len()))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            EaselError::RateLimited { retry_after: None }.kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            EaselError::QuotaExhausted("spent".into()).kind(),
            FailureKind::QuotaExhausted
        );
        assert_eq!(
            EaselError::AccessDenied("no".into()).kind(),
            FailureKind::AccessDenied
        );
        assert_eq!(
            EaselError::ModelUnavailable("down".into()).kind(),
            FailureKind::ModelUnavailable
        );
        assert_eq!(
            EaselError::ContentRejected("nsfw".into()).kind(),
            FailureKind::ContentRejected
        );
        assert_eq!(
            EaselError::MalformedResponse("??".into()).kind(),
            FailureKind::MalformedResponse
        );
        assert_eq!(
            EaselError::Decode("bad base64".into()).kind(),
            FailureKind::MalformedResponse
        );
        assert_eq!(
            EaselError::Api {
                status: 500,
                message: "boom".into()
            }
            .kind(),
            FailureKind::Unknown
        );
    }

    #[test]
    fn test_high_traffic_reports_rate_limited_but_stays_terminal() {
        let err = EaselError::HighTraffic {
            suggested: Duration::from_secs(54),
        };
        assert_eq!(err.kind(), FailureKind::RateLimited);
        assert!(!err.rotates_credential());
        assert!(!err.retries_in_place());
    }

    #[test]
    fn test_rotation_and_fallback_predicates() {
        assert!(EaselError::RateLimited { retry_after: None }.rotates_credential());
        assert!(EaselError::QuotaExhausted("spent".into()).rotates_credential());
        assert!(!EaselError::QuotaExhausted("spent".into()).retries_in_place());
        assert!(EaselError::AccessDenied("no".into()).advances_model());
        assert!(EaselError::ModelUnavailable("down".into()).advances_model());
        assert!(!EaselError::ContentRejected("nsfw".into()).is_retryable());
        assert!(!EaselError::MalformedResponse("??".into()).is_retryable());
    }

    #[test]
    fn test_exhausted_preserves_last_kind() {
        let err = EaselError::Exhausted {
            kind: FailureKind::RateLimited,
            detail: "2 credentials tried".into(),
        };
        assert_eq!(err.kind(), FailureKind::RateLimited);
        assert!(!err.rotates_credential());
    }

    #[test]
    fn test_retry_after() {
        let err = EaselError::RateLimited {
            retry_after: Some(Duration::from_secs(54)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(54)));
        assert_eq!(EaselError::AccessDenied("no".into()).retry_after(), None);
    }

    #[test]
    fn test_sanitize_redacts_key_params() {
        let text = "request to /v1/models?key=AIzaSyFAKE123&alt=json failed";
        let clean = sanitize_error_message(text);
        assert!(!clean.contains("AIzaSyFAKE123"));
        assert!(clean.contains("key=REDACTED"));
        assert!(clean.contains("&alt=json"));
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let text = "x".repeat(2000);
        let clean = sanitize_error_message(&text);
        assert!(clean.len() <= MAX_ERROR_LEN + 3);
        assert!(clean.ends_with("..."));
    }

    #[test]
    fn test_display_messages() {
        let err = EaselError::Api {
            status: 404,
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "API error: 404 - Not found");
        assert_eq!(FailureKind::ContentRejected.to_string(), "content-rejected");
    }
}
