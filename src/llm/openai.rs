//! `OpenAI`-compatible streaming provider implementation

use super::types::{
    ChatRequest, FragmentStream, StreamFragment, ToolDefinition, WireMessage, DEFAULT_MODEL,
};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// `OpenAI`-compatible streaming chat service.
pub struct OpenAiService {
    client: Client,
    api_key: String,
    model: String,
    completions_url: String,
}

impl OpenAiService {
    pub fn new(api_key: String, model: Option<String>, api_base: Option<&str>) -> Self {
        let base = api_base.unwrap_or(DEFAULT_API_BASE);
        let completions_url = format!("{}/chat/completions", base.trim_end_matches('/'));

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            completions_url,
        }
    }

    fn translate_request<'a>(&'a self, request: &'a ChatRequest) -> OpenAiRequest<'a> {
        let functions = if request.functions.is_empty() {
            None
        } else {
            Some(request.functions.as_slice())
        };

        OpenAiRequest {
            model: &self.model,
            messages: &request.messages,
            functions,
            function_call: functions.map(|_| "auto"),
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            max_tokens: request.sampling.max_tokens,
            stream: true,
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        let message = serde_json::from_str::<OpenAiErrorResponse>(body)
            .map_or_else(|_| body.to_string(), |parsed| parsed.error.message);

        match status.as_u16() {
            401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
            429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
            400 => LlmError::invalid_request(format!("Invalid request: {message}")),
            500..=599 => LlmError::server_error(format!("Server error: {message}")),
            _ => LlmError::unknown(format!("HTTP {status}: {message}")),
        }
    }
}

#[async_trait]
impl LlmService for OpenAiService {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.completions_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            return Err(Self::classify_error(status, &body));
        }

        let (tx, stream) = FragmentStream::channel();
        let byte_stream = response.bytes_stream();
        tokio::spawn(async move {
            parse_sse_stream(byte_stream, tx).await;
        });

        Ok(stream)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Parse an SSE byte stream from an `OpenAI`-compatible streaming response.
///
/// Emits one fragment per text delta, call-name delta, and call-arguments
/// delta, in arrival order. The channel closes when the provider sends
/// `[DONE]` or the connection ends; transport errors are sent in-band.
async fn parse_sse_stream(
    byte_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
    tx: mpsc::UnboundedSender<Result<StreamFragment, LlmError>>,
) {
    let mut line_buffer = String::new();
    let mut stream = Box::pin(byte_stream);

    while let Some(result) = stream.next().await {
        let bytes = match result {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "SSE stream error");
                let _ = tx.send(Err(LlmError::network(format!("Stream interrupted: {e}"))));
                return;
            }
        };

        line_buffer.push_str(&String::from_utf8_lossy(&bytes));

        // Process complete lines
        while let Some(newline_pos) = line_buffer.find('\n') {
            let line: String = line_buffer.drain(..=newline_pos).collect();
            let line = line.trim_end();

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };

            if data == "[DONE]" {
                return;
            }

            let chunk: serde_json::Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!(error = %e, "SSE parse error (skipping chunk)");
                    continue;
                }
            };

            let Some(delta) = chunk
                .get("choices")
                .and_then(|c| c.as_array())
                .and_then(|c| c.first())
                .and_then(|choice| choice.get("delta"))
            else {
                continue;
            };

            if let Some(content) = delta.get("content").and_then(|v| v.as_str()) {
                if !content.is_empty()
                    && tx.send(Ok(StreamFragment::text(content))).is_err()
                {
                    return;
                }
            }

            if let Some(function_call) = delta.get("function_call") {
                if let Some(name) = function_call.get("name").and_then(|v| v.as_str()) {
                    if tx.send(Ok(StreamFragment::call_name(name))).is_err() {
                        return;
                    }
                }
                if let Some(arguments) = function_call.get("arguments").and_then(|v| v.as_str()) {
                    if !arguments.is_empty()
                        && tx
                            .send(Ok(StreamFragment::call_arguments(arguments)))
                            .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }
    // Stream ended without [DONE]; the dropped sender closes the channel.
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
    #[allow(dead_code)]
    r#type: Option<String>,
    #[allow(dead_code)]
    code: Option<String>,
}
