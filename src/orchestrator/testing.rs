//! Mock implementations for orchestrator and session tests
//!
//! These mocks enable driving full runs without network I/O.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{ChatRequest, FragmentStream, LlmError, LlmService, StreamFragment};
use crate::tools::{Tool, ToolOutput};

/// Scripted LLM service: each queued script becomes one streamed response,
/// delivered fragment by fragment before the stream closes.
pub struct MockLlmService {
    scripts: Mutex<VecDeque<Result<Vec<StreamFragment>, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue one streamed response.
    pub fn queue_fragments(&self, fragments: Vec<StreamFragment>) {
        self.scripts.lock().unwrap().push_back(Ok(fragments));
    }

    /// Queue a request-level failure.
    pub fn queue_error(&self, error: LlmError) {
        self.scripts.lock().unwrap().push_back(Err(error));
    }

    /// Number of requests made so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// All requests made so far.
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.scripts.lock().unwrap().pop_front() {
            Some(Ok(fragments)) => {
                let (tx, stream) = FragmentStream::channel();
                for fragment in fragments {
                    let _ = tx.send(Ok(fragment));
                }
                // Dropping the sender closes the stream.
                Ok(stream)
            }
            Some(Err(error)) => Err(error),
            None => Err(LlmError::unknown("no scripted response queued")),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

/// LLM service whose streams stay open forever (cancellation tests).
pub struct StallingLlmService {
    holders: Mutex<Vec<tokio::sync::mpsc::UnboundedSender<Result<StreamFragment, LlmError>>>>,
}

impl StallingLlmService {
    pub fn new() -> Self {
        Self {
            holders: Mutex::new(Vec::new()),
        }
    }
}

impl Default for StallingLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for StallingLlmService {
    async fn stream_chat(&self, _request: &ChatRequest) -> Result<FragmentStream, LlmError> {
        let (tx, stream) = FragmentStream::channel();
        // Keep the sender alive so the stream never closes.
        self.holders.lock().unwrap().push(tx);
        Ok(stream)
    }

    fn model_id(&self) -> &str {
        "stalling-model"
    }
}

/// Stub tool returning a fixed output and recording its invocations.
pub struct StubTool {
    name: String,
    schema: Value,
    output: ToolOutput,
    calls: Mutex<Vec<Value>>,
}

impl StubTool {
    pub fn new(name: impl Into<String>, schema: Value, output: ToolOutput) -> Self {
        Self {
            name: name.into(),
            schema,
            output,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn recorded_calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Stub {}", self.name)
    }

    fn parameters(&self) -> Value {
        self.schema.clone()
    }

    async fn run(&self, args: Value) -> ToolOutput {
        self.calls.lock().unwrap().push(args);
        self.output.clone()
    }
}

/// Tool that never finishes (cancellation tests).
pub struct HangingTool;

#[async_trait]
impl Tool for HangingTool {
    fn name(&self) -> &str {
        "hang"
    }

    fn description(&self) -> String {
        "Never returns".to_string()
    }

    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _args: Value) -> ToolOutput {
        futures::future::pending().await
    }
}
