//! Generation orchestrator: drives credential rotation, model fallback, and
//! backoff around provider clients to produce one normalized result.

use crate::audit::{AuditSink, UsageEvent};
use crate::backoff::BackoffPolicy;
use crate::config::OrchestratorConfig;
use crate::credentials::Credential;
use crate::error::{EaselError, Result};
use crate::fallback::ModelChain;
use crate::provider::ProviderClient;
use crate::types::{GeneratedImage, GenerationRequest, ModelId, ProviderKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The façade accepting [`GenerationRequest`]s.
///
/// One orchestrator serves any number of concurrent requests; the only
/// shared state is the read-only configuration and client registry. Within
/// a request, attempts run strictly sequentially; dropping the returned
/// future cancels the in-flight call or backoff wait without leaking the
/// retry loop.
pub struct Orchestrator {
    config: OrchestratorConfig,
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
    audit: Option<Arc<dyn AuditSink>>,
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    audit: Option<Arc<dyn AuditSink>>,
    clients: Vec<Arc<dyn ProviderClient>>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the audit sink receiving successful-generation events.
    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Registers a provider client, replacing any built-in client of the
    /// same kind.
    pub fn client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.clients.push(client);
        self
    }

    /// Builds the orchestrator, wiring feature-enabled built-in clients for
    /// every configured provider over one shared HTTP client.
    pub fn build(self) -> Result<Orchestrator> {
        let http = reqwest::Client::builder()
            .timeout(self.config.retry.request_timeout())
            .build()
            .map_err(|e| EaselError::Config(format!("failed to build HTTP client: {e}")))?;

        let mut clients: HashMap<ProviderKind, Arc<dyn ProviderClient>> = HashMap::new();
        for kind in self.config.providers.keys().copied() {
            if let Some(client) = builtin_client(kind, &http) {
                clients.insert(kind, client);
            }
        }
        for client in self.clients {
            clients.insert(client.kind(), client);
        }

        Ok(Orchestrator {
            config: self.config,
            clients,
            audit: self.audit,
        })
    }
}

#[allow(unused_variables)]
fn builtin_client(kind: ProviderKind, http: &reqwest::Client) -> Option<Arc<dyn ProviderClient>> {
    match kind {
        #[cfg(feature = "gemini")]
        ProviderKind::Gemini => Some(Arc::new(crate::providers::GeminiClient::with_http(
            http.clone(),
        ))),
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => Some(Arc::new(crate::providers::OpenAiClient::with_http(
            http.clone(),
        ))),
        #[cfg(feature = "openrouter")]
        ProviderKind::OpenRouter => Some(Arc::new(crate::providers::OpenRouterClient::with_http(
            http.clone(),
        ))),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

impl Orchestrator {
    /// Creates a new [`OrchestratorBuilder`].
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Executes one generation request to completion.
    ///
    /// Drives the provider's credential pool over its model fallback chain
    /// with backoff-governed retries, returns the first success, and
    /// schedules the audit side effect without blocking the return. On
    /// exhaustion the caller gets a classified error, never a raw provider
    /// failure.
    pub async fn run(&self, request: GenerationRequest) -> Result<GeneratedImage> {
        if request.prompt.trim().is_empty() {
            return Err(EaselError::InvalidRequest("prompt is empty".into()));
        }

        let client = self
            .clients
            .get(&request.provider)
            .ok_or_else(|| {
                EaselError::Config(format!(
                    "no client registered for provider {}",
                    request.provider
                ))
            })?
            .as_ref();
        let provider_config = self.config.provider(request.provider)?;
        let policy = self.config.retry.policy();

        let started = Instant::now();
        let image = provider_config
            .credentials
            .try_each(|credential| {
                self.run_chain(client, &provider_config.models, credential, &request, &policy)
            })
            .await?;
        let elapsed = started.elapsed();

        tracing::debug!(
            provider = %request.provider,
            feature = %request.feature,
            elapsed_ms = elapsed.as_millis() as u64,
            "generation succeeded"
        );

        if let Some(sink) = &self.audit {
            spawn_audit(Arc::clone(sink), &request, &image, elapsed);
        }

        Ok(image)
    }

    /// Runs a provider's health check with the primary credential.
    pub async fn health_check(&self, provider: ProviderKind) -> Result<()> {
        let client = self.clients.get(&provider).ok_or_else(|| {
            EaselError::Config(format!("no client registered for provider {provider}"))
        })?;
        let provider_config = self.config.provider(provider)?;
        provider_config
            .credentials
            .try_each(|credential| async move { client.health_check(&credential).await })
            .await
    }

    async fn run_chain(
        &self,
        client: &dyn ProviderClient,
        chain: &ModelChain,
        credential: Credential,
        request: &GenerationRequest,
        policy: &BackoffPolicy,
    ) -> Result<GeneratedImage> {
        chain
            .try_each(move |model| {
                attempt_with_retry(client, model, credential.clone(), request, policy)
            })
            .await
    }
}

/// Runs one model/credential pair with backoff-governed retries.
///
/// Only transient rate limits retry in place; the attempt counter is local,
/// so a fresh model or credential always starts with a full budget.
async fn attempt_with_retry(
    client: &dyn ProviderClient,
    model: ModelId,
    credential: Credential,
    request: &GenerationRequest,
    policy: &BackoffPolicy,
) -> Result<GeneratedImage> {
    let mut attempt = 0u32;
    loop {
        match client.generate(&model, &credential, request).await {
            Ok(image) => return Ok(image),
            Err(err) if err.retries_in_place() && attempt < policy.max_retries => {
                let Some(delay) = policy.compute_delay(&err, attempt) else {
                    // Waiting longer than the ceiling would hang an
                    // interactive caller; surface the traffic condition
                    // instead.
                    let suggested = err.retry_after().unwrap_or(policy.ceiling);
                    return Err(EaselError::HighTraffic { suggested });
                };
                tracing::warn!(
                    model = %model,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Detaches the audit side effect: upload the image, then append the usage
/// event. An upload failure still appends the event (without the image
/// reference) so usage accounting is not silently lost; every failure lands
/// in the log side channel.
fn spawn_audit(
    sink: Arc<dyn AuditSink>,
    request: &GenerationRequest,
    image: &GeneratedImage,
    elapsed: Duration,
) {
    let feature = request.feature;
    let prompt = request.prompt.clone();
    let image = image.clone();
    tokio::spawn(async move {
        let image_url = match sink.put(&image).await {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(error = %err, "audit image upload failed");
                None
            }
        };
        let event = UsageEvent {
            feature,
            prompt,
            image_url,
            duration_secs: elapsed.as_secs_f64(),
        };
        if let Err(err) = sink.append(event).await {
            tracing::warn!(error = %err, "audit event append failed");
        }
    });
}
