//! Provider client trait.

use crate::credentials::Credential;
use crate::error::Result;
use crate::types::{GeneratedImage, GenerationRequest, ModelId, ProviderKind};
use async_trait::async_trait;

/// One external generation provider.
///
/// The model and credential are per-call arguments rather than constructor
/// state, so a single client instance serves every credential in the pool
/// and every model in the fallback chain. Implementations classify every
/// raw failure into exactly one [`crate::FailureKind`] before returning;
/// callers above this boundary branch only on the classification.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Returns the kind of this provider.
    fn kind(&self) -> ProviderKind;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        match self.kind() {
            ProviderKind::Gemini => "Gemini (Google)",
            ProviderKind::OpenAi => "OpenAI Images",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    /// Executes one generation attempt against `model` with `credential`.
    ///
    /// A moderation verdict surfaced alongside content takes precedence and
    /// yields `ContentRejected` even if partial content exists.
    async fn generate(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage>;

    /// Checks that the provider is reachable and the credential accepted.
    async fn health_check(&self, credential: &Credential) -> Result<()>;
}
