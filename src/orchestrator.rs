//! Tool-call orchestration loop
//!
//! Drives one run of the request/execute/respond cycle: stream a model
//! response over the transcript, detect an embedded function call, execute
//! the named tool, append the results, and re-invoke the model until it
//! produces plain text or the iteration bound is hit.

#[cfg(test)]
pub mod testing;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::llm::{
    CallDelta, ChatRequest, FragmentStream, LlmError, LlmService, ResponseAccumulator,
    SamplingParams, StreamFragment, StreamOutcome, WireMessage,
};
use crate::session::ChatEvent;
use crate::tools::ToolRegistry;
use crate::transcript::{FunctionCall, Transcript, Turn};

/// Maximum model round-trips per orchestration run.
pub const MAX_TOOL_ITERATIONS: u32 = 5;

const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Errors that terminate an orchestration run.
///
/// Failures never touch turns that were already finalized: the transcript is
/// left in its last consistent state.
#[derive(Debug, Error)]
pub enum RunError {
    /// The model named an unknown function, sent unusable arguments, or
    /// produced an empty response.
    #[error("model protocol violation: {0}")]
    Protocol(String),

    /// A tool ran and reported failure. Not retried.
    #[error("function '{name}' failed: {message}")]
    ToolFailed { name: String, message: String },

    #[error("reached maximum number of tool-call iterations")]
    IterationLimit,

    #[error(transparent)]
    Upstream(#[from] LlmError),

    #[error("run cancelled")]
    Cancelled,
}

/// Executes orchestration runs against one transcript at a time.
pub struct Orchestrator {
    llm: Arc<dyn LlmService>,
    tools: Arc<ToolRegistry>,
    events: broadcast::Sender<ChatEvent>,
    sampling: SamplingParams,
    context_document: Option<String>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmService>,
        tools: Arc<ToolRegistry>,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            llm,
            tools,
            events,
            sampling: SamplingParams::default(),
            context_document: None,
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_context_document(mut self, document: Option<String>) -> Self {
        self.context_document = document;
        self
    }

    /// Run one orchestration cycle over `transcript`, which must already end
    /// with the user turn being answered. Only finalized turns are appended;
    /// cancellation discards any pending output.
    pub async fn run(
        &self,
        transcript: &mut Transcript,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        for iteration in 1..=MAX_TOOL_ITERATIONS {
            tracing::debug!(iteration, model = %self.llm.model_id(), "model round-trip");

            let request = self.build_request(transcript);
            let mut stream = self.open_stream(&request, cancel).await?;
            let mut accumulator = ResponseAccumulator::new();

            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        tracing::info!("run cancelled mid-stream, discarding pending output");
                        return Err(RunError::Cancelled);
                    }

                    fragment = stream.next() => match fragment {
                        Some(Ok(fragment)) => {
                            self.emit_fragment(&fragment);
                            accumulator.absorb(fragment);
                        }
                        Some(Err(e)) => return Err(RunError::Upstream(e)),
                        None => break,
                    }
                }
            }

            match accumulator.finish() {
                StreamOutcome::Text(text) => {
                    let turn = Turn::assistant(text);
                    transcript
                        .push(turn.clone())
                        .map_err(|e| RunError::Protocol(e.to_string()))?;
                    let _ = self.events.send(ChatEvent::TurnAdded { turn });
                    return Ok(());
                }
                StreamOutcome::FunctionCall(call) => {
                    self.execute_call(transcript, call, cancel).await?;
                }
                StreamOutcome::Empty => {
                    return Err(RunError::Protocol("empty response from model".to_string()));
                }
            }
        }

        Err(RunError::IterationLimit)
    }

    /// Build the model-visible request: the replayed transcript, the session
    /// context document (never persisted as a turn), and the tool table.
    fn build_request(&self, transcript: &Transcript) -> ChatRequest {
        let mut messages = transcript.wire_messages();
        if let Some(document) = &self.context_document {
            messages.push(WireMessage {
                role: "system",
                content: Some(context_prompt(document)),
                function_call: None,
                name: None,
            });
        }
        ChatRequest {
            messages,
            functions: self.tools.definitions(),
            sampling: self.sampling,
        }
    }

    /// Open the streaming request, retrying retryable failures with
    /// exponential backoff. Only the initial request is retried; a failure
    /// after fragments have been observed would duplicate already-delivered
    /// output.
    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<FragmentStream, RunError> {
        let mut attempt = 1;
        loop {
            match self.llm.stream_chat(request).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind.is_retryable() && attempt < MAX_RETRY_ATTEMPTS => {
                    let delay = e.retry_after.unwrap_or_else(|| retry_delay(attempt));
                    tracing::warn!(
                        error = %e,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        "model request failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(RunError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(RunError::Upstream(e)),
            }
        }
    }

    async fn execute_call(
        &self,
        transcript: &mut Transcript,
        call: FunctionCall,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let Some(tool) = self.tools.get(&call.name) else {
            self.emit_call_failed(&call.name, "unknown function");
            return Err(RunError::Protocol(format!(
                "model requested unknown function '{}'",
                call.name
            )));
        };

        let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                self.emit_call_failed(&call.name, "malformed arguments");
                return Err(RunError::Protocol(format!(
                    "malformed arguments for '{}': {e}",
                    call.name
                )));
            }
        };

        if let Err(reason) = ToolRegistry::validate_arguments(&tool.parameters(), &args) {
            self.emit_call_failed(&call.name, &reason);
            return Err(RunError::Protocol(format!(
                "invalid arguments for '{}': {reason}",
                call.name
            )));
        }

        tracing::info!(function = %call.name, "executing function call");
        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(function = %call.name, "run cancelled during tool execution");
                return Err(RunError::Cancelled);
            }
            output = tool.run(args) => output,
        };

        if !output.success {
            self.emit_call_failed(&call.name, &output.output);
            return Err(RunError::ToolFailed {
                name: call.name,
                message: output.output,
            });
        }

        let request_turn = Turn::assistant_call(call.clone());
        transcript
            .push(request_turn.clone())
            .map_err(|e| RunError::Protocol(e.to_string()))?;
        let result_turn = Turn::function_result(&call.name, &output.output);
        transcript
            .push(result_turn.clone())
            .map_err(|e| RunError::Protocol(e.to_string()))?;

        let _ = self.events.send(ChatEvent::CallFinished {
            name: call.name,
            ok: true,
            result: output.output,
        });
        let _ = self.events.send(ChatEvent::TurnAdded { turn: request_turn });
        let _ = self.events.send(ChatEvent::TurnAdded { turn: result_turn });
        Ok(())
    }

    /// Surface the live partial view: one event per fragment.
    fn emit_fragment(&self, fragment: &StreamFragment) {
        if let Some(text) = &fragment.text {
            let _ = self.events.send(ChatEvent::TextDelta { text: text.clone() });
        }
        match &fragment.call {
            Some(CallDelta::Name(name)) => {
                let _ = self.events.send(ChatEvent::CallStarted { name: name.clone() });
            }
            Some(CallDelta::Arguments(arguments)) => {
                let _ = self.events.send(ChatEvent::CallArgumentsDelta {
                    arguments: arguments.clone(),
                });
            }
            None => {}
        }
    }

    fn emit_call_failed(&self, name: &str, reason: &str) {
        let _ = self.events.send(ChatEvent::CallFinished {
            name: name.to_string(),
            ok: false,
            result: reason.to_string(),
        });
    }
}

fn retry_delay(attempt: u32) -> Duration {
    // Exponential backoff: 1s, 2s, 4s
    Duration::from_secs(1 << (attempt - 1))
}

fn context_prompt(document: &str) -> String {
    format!(
        "The user provided the following document for context. Please refer to the document in your response.\n\n----------\n\n{document}\n\n----------"
    )
}
