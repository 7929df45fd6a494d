//! Usage/audit sink: best-effort recording of successful generations.

use crate::error::Result;
use crate::types::{Feature, GeneratedImage};
use async_trait::async_trait;
use serde::Serialize;

/// One "generation succeeded" record for usage accounting.
#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    /// The user action that produced the generation.
    pub feature: Feature,
    /// The prompt that was submitted.
    pub prompt: String,
    /// Where the audited copy of the image landed, if the upload succeeded.
    pub image_url: Option<String>,
    /// Wall-clock duration of the foreground call in seconds.
    pub duration_secs: f64,
}

/// External collaborator receiving audited images and usage events.
///
/// The orchestrator calls this from a detached background task after the
/// user-facing result has already been returned; both operations are
/// best-effort and their failures are logged, never propagated. `put` and
/// `append` are assumed idempotent-enough for at-least-zero delivery.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Stores a copy of the generated image, returning its storage URL.
    async fn put(&self, image: &GeneratedImage) -> Result<String>;

    /// Appends a usage event to the audit log.
    async fn append(&self, event: UsageEvent) -> Result<()>;
}
