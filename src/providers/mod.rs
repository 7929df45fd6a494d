//! Provider clients.

#[cfg(feature = "gemini")]
mod gemini;
#[cfg(feature = "openai")]
mod openai;
#[cfg(feature = "openrouter")]
mod openrouter;

#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;

#[cfg(feature = "openai")]
pub use openai::OpenAiClient;

#[cfg(feature = "openrouter")]
pub use openrouter::OpenRouterClient;
