//! Injected configuration: credential pools, model chains, retry knobs.
//!
//! Everything here is an externally supplied value handed to the
//! orchestrator at construction. There is no module-level state; two
//! orchestrators with different configurations coexist freely.

use crate::backoff::BackoffPolicy;
use crate::credentials::{Credential, CredentialPool};
use crate::error::{EaselError, Result};
use crate::fallback::ModelChain;
use crate::types::ProviderKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Per-provider configuration: the ordered credentials and models to drive.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
    /// Ordered credentials, primary first.
    pub credentials: CredentialPool,
    /// Ordered models, primary first.
    pub models: ModelChain,
}

impl ProviderConfig {
    /// Creates a provider configuration.
    pub fn new(credentials: CredentialPool, models: ModelChain) -> Self {
        Self {
            credentials,
            models,
        }
    }
}

/// Retry and timeout knobs shared by every provider.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed per model/credential pair before rotating.
    pub max_retries: u32,
    /// Base delay of the exponential backoff schedule, in milliseconds.
    pub initial_delay_ms: u64,
    /// Longest backoff wait served before failing fast, in milliseconds.
    pub ceiling_ms: u64,
    /// Per-request timeout for provider calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1_000,
            ceiling_ms: 15_000,
            request_timeout_secs: 90,
        }
    }
}

impl RetryConfig {
    /// Builds the backoff policy these knobs describe.
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            self.max_retries,
            Duration::from_millis(self.ceiling_ms),
        )
    }

    /// Returns the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Complete orchestrator configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrchestratorConfig {
    /// Configured providers.
    #[serde(default)]
    pub providers: HashMap<ProviderKind, ProviderConfig>,
    /// Retry and timeout knobs.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl OrchestratorConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a provider's configuration.
    pub fn with_provider(mut self, kind: ProviderKind, config: ProviderConfig) -> Self {
        self.providers.insert(kind, config);
        self
    }

    /// Replaces the retry knobs.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Looks up a provider's configuration.
    pub fn provider(&self, kind: ProviderKind) -> Result<&ProviderConfig> {
        self.providers
            .get(&kind)
            .ok_or_else(|| EaselError::Config(format!("provider {kind} is not configured")))
    }

    /// Assembles a configuration from environment variables.
    ///
    /// For each provider, a `*_API_KEYS` variable holds a comma-separated
    /// priority list; the singular `*_API_KEY` form is the one-key
    /// fallback. Providers with no key present are left unconfigured.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(pool) = pool_from_env(&["GOOGLE_API_KEYS", "GOOGLE_API_KEY"]) {
            config.providers.insert(
                ProviderKind::Gemini,
                ProviderConfig::new(
                    pool,
                    ["gemini-2.5-flash-image", "gemini-2.0-flash-preview-image-generation"]
                        .into_iter()
                        .collect(),
                ),
            );
        }
        if let Some(pool) = pool_from_env(&["OPENAI_API_KEYS", "OPENAI_API_KEY"]) {
            config.providers.insert(
                ProviderKind::OpenAi,
                ProviderConfig::new(pool, ["gpt-image-1", "dall-e-3"].into_iter().collect()),
            );
        }
        if let Some(pool) = pool_from_env(&["OPENROUTER_API_KEYS", "OPENROUTER_API_KEY"]) {
            config.providers.insert(
                ProviderKind::OpenRouter,
                ProviderConfig::new(
                    pool,
                    ["google/gemini-2.5-flash-image", "openai/gpt-image-1"]
                        .into_iter()
                        .collect(),
                ),
            );
        }
        config
    }
}

fn pool_from_env(vars: &[&str]) -> Option<CredentialPool> {
    for var in vars {
        if let Ok(value) = std::env::var(var) {
            let credentials: Vec<Credential> = value
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Credential::from)
                .collect();
            if !credentials.is_empty() {
                return Some(CredentialPool::new(credentials));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.initial_delay_ms, 1_000);
        assert_eq!(retry.ceiling_ms, 15_000);
        assert_eq!(retry.request_timeout_secs, 90);
        assert_eq!(retry.request_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_retry_policy_conversion() {
        let retry = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 2_000,
            ceiling_ms: 20_000,
            request_timeout_secs: 30,
        };
        let policy = retry.policy();
        assert_eq!(policy.initial_delay, Duration::from_secs(2));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.ceiling, Duration::from_secs(20));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = r#"{
            "providers": {
                "gemini": {
                    "credentials": ["key-a", "key-b"],
                    "models": ["gemini-2.5-flash-image", "gemini-2.5-flash-image"]
                }
            },
            "retry": { "initial_delay_ms": 2000 }
        }"#;
        let config: OrchestratorConfig = serde_json::from_str(json).unwrap();
        let provider = config.provider(ProviderKind::Gemini).unwrap();
        assert_eq!(provider.credentials.len(), 2);
        assert_eq!(provider.models.len(), 2);
        assert_eq!(config.retry.initial_delay_ms, 2_000);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_unconfigured_provider_is_an_error() {
        let config = OrchestratorConfig::new();
        assert!(matches!(
            config.provider(ProviderKind::OpenAi).unwrap_err(),
            EaselError::Config(_)
        ));
    }

    #[test]
    fn test_builder_style_assembly() {
        let config = OrchestratorConfig::new()
            .with_provider(
                ProviderKind::OpenAi,
                ProviderConfig::new(
                    CredentialPool::single("sk-test"),
                    ModelChain::single("gpt-image-1"),
                ),
            )
            .with_retry(RetryConfig {
                max_retries: 1,
                ..Default::default()
            });
        assert!(config.provider(ProviderKind::OpenAi).is_ok());
        assert_eq!(config.retry.max_retries, 1);
    }
}
