#![warn(missing_docs)]
//! Easel - resilient AI image generation.
//!
//! This crate orchestrates image generation and editing requests against
//! slow, rate-limited, intermittently unavailable providers: it selects a
//! provider and model, retries with backoff, falls back across models and
//! credentials on the failure classes where that helps, and normalizes the
//! providers' incompatible response shapes into a single result type.
//!
//! # Quick Start
//!
//! ```no_run
//! use easel::{GenerationRequest, Orchestrator, OrchestratorConfig, ProviderKind};
//!
//! #[tokio::main]
//! async fn main() -> easel::Result<()> {
//!     let orchestrator = Orchestrator::builder()
//!         .config(OrchestratorConfig::from_env())
//!         .build()?;
//!
//!     let request = GenerationRequest::new("A golden retriever puppy")
//!         .with_provider(ProviderKind::Gemini);
//!     let image = orchestrator.run(request).await?;
//!     image.save("puppy.png")?;
//!     Ok(())
//! }
//! ```
//!
//! # Image Editing
//!
//! ```no_run
//! use easel::{Feature, GenerationRequest, ImageRef, Orchestrator, OrchestratorConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> easel::Result<()> {
//! let orchestrator = Orchestrator::builder()
//!     .config(OrchestratorConfig::from_env())
//!     .build()?;
//!
//! let source = ImageRef::from_bytes(std::fs::read("photo.png")?)?;
//! let request = GenerationRequest::new("Replace the sky with a sunset")
//!     .with_feature(Feature::Edit)
//!     .with_image(source);
//! let image = orchestrator.run(request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `gemini`: Gemini (Google) provider client
//! - `openai`: OpenAI images provider client
//! - `openrouter`: OpenRouter provider client
//! - `cli`: the `easel` command-line interface

pub mod audit;
pub mod backoff;
pub mod codec;
pub mod config;
pub mod credentials;
mod error;
pub mod fallback;
mod orchestrator;
mod provider;
pub mod providers;
mod types;

pub use audit::{AuditSink, UsageEvent};
pub use backoff::BackoffPolicy;
pub use config::{OrchestratorConfig, ProviderConfig, RetryConfig};
pub use credentials::{Credential, CredentialPool};
pub use error::{EaselError, FailureKind, Result};
pub use fallback::ModelChain;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use provider::ProviderClient;
pub use types::{
    Feature, GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImagePayload,
    ImageRef, ModelId, ProviderKind,
};

#[cfg(feature = "gemini")]
pub use providers::GeminiClient;

#[cfg(feature = "openai")]
pub use providers::OpenAiClient;

#[cfg(feature = "openrouter")]
pub use providers::OpenRouterClient;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{EaselError, FailureKind, Result};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::provider::ProviderClient;
    pub use crate::types::{
        Feature, GeneratedImage, GenerationRequest, ImagePayload, ImageRef, ProviderKind,
    };

    pub use crate::config::OrchestratorConfig;

    #[cfg(feature = "gemini")]
    pub use crate::providers::GeminiClient;

    #[cfg(feature = "openai")]
    pub use crate::providers::OpenAiClient;

    #[cfg(feature = "openrouter")]
    pub use crate::providers::OpenRouterClient;
}
