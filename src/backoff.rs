//! Backoff policy: how long to wait before retrying a rate-limited attempt.

use crate::error::EaselError;
use std::time::Duration;

/// Safety buffer added on top of a server-suggested wait.
const SUGGESTION_BUFFER: Duration = Duration::from_millis(500);

/// Computes retry delays, preferring a server-suggested wait over
/// exponential backoff, and refusing to wait past a ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base delay for the exponential schedule.
    pub initial_delay: Duration,
    /// Retries allowed per model/credential pair (attempts = retries + 1).
    pub max_retries: u32,
    /// Longest wait the policy will ever serve; anything above fails fast.
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_retries: 2,
            ceiling: Duration::from_secs(15),
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy from explicit knobs.
    pub fn new(initial_delay: Duration, max_retries: u32, ceiling: Duration) -> Self {
        Self {
            initial_delay,
            max_retries,
            ceiling,
        }
    }

    /// Returns the wait before retry number `attempt` (0-based), or `None`
    /// when the wait would exceed the ceiling and the caller should fail
    /// fast instead of hanging an interactive flow.
    ///
    /// A provider-suggested delay is rounded up to whole seconds and padded
    /// with a small buffer so the retry lands after the provider's window
    /// actually resets.
    pub fn compute_delay(&self, error: &EaselError, attempt: u32) -> Option<Duration> {
        let delay = match error.retry_after() {
            Some(suggested) => {
                Duration::from_secs(suggested.as_secs_f64().ceil() as u64) + SUGGESTION_BUFFER
            }
            None => self
                .initial_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        (delay <= self.ceiling).then_some(delay)
    }
}

/// Parses a `Retry-After` header carrying a whole number of seconds.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Parses a wait suggestion out of an error body.
///
/// Recognizes the `"retryDelay": "54s"` field Google attaches to 429
/// payloads and the "retry in N s" phrasing some providers put in plain
/// error text.
pub fn parse_suggested_delay(body: &str) -> Option<Duration> {
    if let Some(seconds) = parse_retry_delay_field(body) {
        return Some(seconds);
    }
    parse_retry_in_phrase(body)
}

fn parse_retry_delay_field(body: &str) -> Option<Duration> {
    let idx = body.find("\"retryDelay\"")?;
    let rest = &body[idx + "\"retryDelay\"".len()..];
    let rest = rest.trim_start_matches([':', ' ', '\t', '"']);
    read_seconds(rest)
}

fn parse_retry_in_phrase(body: &str) -> Option<Duration> {
    let lower = body.to_lowercase();
    let idx = lower.find("retry in ")?;
    let rest = &lower[idx + "retry in ".len()..];
    read_seconds(rest)
}

/// Reads a leading decimal number of seconds, tolerating an `s`/`sec`/
/// `second(s)` suffix.
fn read_seconds(text: &str) -> Option<Duration> {
    let digits_end = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(text.len());
    let number: f64 = text[..digits_end].parse().ok()?;
    if !number.is_finite() || number < 0.0 || number > 86_400.0 {
        return None;
    }
    let suffix = text[digits_end..].trim_start();
    if !(suffix.starts_with('s') || suffix.starts_with('S') || suffix.is_empty()) {
        return None;
    }
    Some(Duration::from_secs_f64(number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    fn rate_limited(retry_after: Option<Duration>) -> EaselError {
        EaselError::RateLimited { retry_after }
    }

    #[test]
    fn test_exponential_schedule() {
        let policy = BackoffPolicy::new(Duration::from_millis(2000), 2, Duration::from_secs(20));
        let err = rate_limited(None);
        assert_eq!(
            policy.compute_delay(&err, 0),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(
            policy.compute_delay(&err, 1),
            Some(Duration::from_millis(4000))
        );
        assert_eq!(
            policy.compute_delay(&err, 2),
            Some(Duration::from_millis(8000))
        );
    }

    #[test]
    fn test_exponential_hits_ceiling() {
        let policy = BackoffPolicy::new(Duration::from_secs(4), 5, Duration::from_secs(15));
        let err = rate_limited(None);
        assert_eq!(policy.compute_delay(&err, 1), Some(Duration::from_secs(8)));
        // 4 * 2^2 = 16s > 15s ceiling.
        assert_eq!(policy.compute_delay(&err, 2), None);
    }

    #[test]
    fn test_suggested_delay_is_padded_and_preferred() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), 2, Duration::from_secs(60));
        let err = rate_limited(Some(Duration::from_secs(7)));
        assert_eq!(
            policy.compute_delay(&err, 0),
            Some(Duration::from_millis(7500))
        );

        let fractional = rate_limited(Some(Duration::from_secs_f64(3.2)));
        assert_eq!(
            policy.compute_delay(&fractional, 0),
            Some(Duration::from_millis(4500))
        );
    }

    #[test]
    fn test_suggested_delay_above_ceiling_fails_fast() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), 2, Duration::from_secs(20));
        let err = rate_limited(Some(Duration::from_secs(54)));
        // 54s + buffer = 54.5s > 20s: never wait, fail the attempt instead.
        assert_eq!(policy.compute_delay(&err, 0), None);
    }

    #[test]
    fn test_parse_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));

        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);

        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_retry_delay_field() {
        let body = r#"{"error":{"code":429,"details":[{"retryDelay":"54s"}]}}"#;
        assert_eq!(
            parse_suggested_delay(body),
            Some(Duration::from_secs(54))
        );

        let fractional = r#"{"retryDelay": "0.8s"}"#;
        assert_eq!(
            parse_suggested_delay(fractional),
            Some(Duration::from_secs_f64(0.8))
        );
    }

    #[test]
    fn test_parse_retry_in_phrase() {
        assert_eq!(
            parse_suggested_delay("Rate limit hit, please retry in 7 seconds"),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            parse_suggested_delay("Retry in 12s."),
            Some(Duration::from_secs(12))
        );
    }

    #[test]
    fn test_parse_rejects_nonsense() {
        assert_eq!(parse_suggested_delay("no hints here"), None);
        assert_eq!(parse_suggested_delay("retry in soon"), None);
        assert_eq!(parse_suggested_delay(r#"{"retryDelay":"never"}"#), None);
        // A suggestion this large is a provider bug, not a wait target.
        assert_eq!(parse_suggested_delay("retry in 9999999 seconds"), None);
    }
}
