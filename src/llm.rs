//! LLM provider abstraction
//!
//! A streaming completion interface over OpenAI-compatible chat APIs with
//! legacy function calling. Fragments arrive incrementally and are folded
//! into a final outcome by the [`ResponseAccumulator`].

mod accumulator;
mod error;
mod openai;
#[cfg(test)]
mod proptests;
mod types;

pub use accumulator::{PendingCall, ResponseAccumulator, StreamOutcome};
pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAiService;
pub use types::*;

use async_trait::async_trait;

/// Common interface for streaming LLM providers.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Open a streaming completion. Fragments arrive on the returned stream
    /// until the provider closes it; transport failures after the stream has
    /// opened are delivered in-band.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream, LlmError>;

    /// Model identifier sent to the provider.
    fn model_id(&self) -> &str;
}

/// Provider configuration, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    /// API root override (e.g. a gateway or a compatible local server).
    pub api_base: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            api_base: std::env::var("OPENAI_API_BASE").ok(),
            model: std::env::var("CHATLOOP_MODEL").ok(),
        }
    }
}
