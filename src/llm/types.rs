//! Common types for LLM interactions

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::LlmError;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Provider-visible message: one transcript turn in wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    /// Always serialized: `null` content is significant for pure
    /// function-call turns.
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<WireFunctionCall>,
    /// Present only on `function`-role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Function exposed to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the function's parameters.
    pub parameters: serde_json::Value,
}

/// Optional sampling parameters forwarded to the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A streaming completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    pub functions: Vec<ToolDefinition>,
    pub sampling: SamplingParams,
}

/// One incremental chunk of a streaming response.
///
/// A fragment may carry a text delta and/or a function-call delta. The call
/// name arrives at most once, before any argument fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: Option<String>,
    pub call: Option<CallDelta>,
}

impl StreamFragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text: Some(delta.into()),
            call: None,
        }
    }

    pub fn call_name(name: impl Into<String>) -> Self {
        Self {
            text: None,
            call: Some(CallDelta::Name(name.into())),
        }
    }

    pub fn call_arguments(delta: impl Into<String>) -> Self {
        Self {
            text: None,
            call: Some(CallDelta::Arguments(delta.into())),
        }
    }
}

/// Function-call portion of a fragment: the name or a slice of the raw
/// arguments JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallDelta {
    Name(String),
    Arguments(String),
}

/// Handle to a streaming response. The stream ends when the sender side is
/// dropped (provider closed the connection); errors after the stream opened
/// arrive in-band.
pub struct FragmentStream {
    rx: mpsc::UnboundedReceiver<Result<StreamFragment, LlmError>>,
}

impl FragmentStream {
    /// Create a stream together with its sending half.
    pub fn channel() -> (
        mpsc::UnboundedSender<Result<StreamFragment, LlmError>>,
        Self,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Next fragment, or `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Option<Result<StreamFragment, LlmError>> {
        self.rx.recv().await
    }
}
