//! Conversation transcript model
//!
//! A transcript is an ordered, append-only log of role-tagged turns owned by
//! exactly one chat session. Insertion order is the conversation order and is
//! replayed verbatim (mapped to the provider wire shape) on every model call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{WireFunctionCall, WireMessage};

/// Assistant greeting seeded into every new transcript.
pub const GREETING: &str = "How can I help you?";

/// A function invocation requested by the model.
///
/// `arguments` is the raw JSON text exactly as streamed, concatenated from
/// argument fragments. It is not guaranteed to parse until the orchestrator
/// validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One role-tagged entry in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    System {
        content: String,
    },
    User {
        content: String,
    },
    /// Plain text, a function-call request, or both. At least one must be
    /// present; `Transcript::push` rejects turns with neither.
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function_call: Option<FunctionCall>,
    },
    /// Result of executing the named function, fed back to the model.
    Function {
        name: String,
        content: String,
    },
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Turn::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Turn::User {
            content: content.into(),
        }
    }

    /// Assistant turn carrying finalized text.
    pub fn assistant(content: impl Into<String>) -> Self {
        Turn::Assistant {
            content: Some(content.into()),
            function_call: None,
        }
    }

    /// Assistant turn carrying a function-call request and no text.
    pub fn assistant_call(call: FunctionCall) -> Self {
        Turn::Assistant {
            content: None,
            function_call: Some(call),
        }
    }

    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Turn::Function {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Violations of the transcript's structural invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("assistant turn must carry text content or a function call")]
    EmptyAssistantTurn,
    #[error("function result '{0}' does not follow an assistant turn calling it")]
    OrphanFunctionResult(String),
}

/// Ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh transcript seeded with an optional system prompt and the
    /// assistant greeting.
    pub fn seeded(system_prompt: Option<&str>, greeting: &str) -> Self {
        let mut turns = Vec::new();
        if let Some(prompt) = system_prompt {
            turns.push(Turn::system(prompt));
        }
        turns.push(Turn::assistant(greeting));
        Self { turns }
    }

    /// Append a turn, enforcing structural invariants:
    /// an assistant turn must carry content or a call, and a function result
    /// must immediately follow the assistant turn that requested it.
    pub fn push(&mut self, turn: Turn) -> Result<(), TranscriptError> {
        match &turn {
            Turn::Assistant {
                content: None,
                function_call: None,
            } => return Err(TranscriptError::EmptyAssistantTurn),
            Turn::Function { name, .. } => {
                let matches_call = matches!(
                    self.turns.last(),
                    Some(Turn::Assistant {
                        function_call: Some(call),
                        ..
                    }) if call.name == *name
                );
                if !matches_call {
                    return Err(TranscriptError::OrphanFunctionResult(name.clone()));
                }
            }
            _ => {}
        }
        self.turns.push(turn);
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[allow(dead_code)] // Used in tests
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    #[allow(dead_code)] // Used in tests
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Map the transcript to the provider-visible message list. Pure: the
    /// same transcript always yields the same list.
    pub fn wire_messages(&self) -> Vec<WireMessage> {
        self.turns
            .iter()
            .map(|turn| match turn {
                Turn::System { content } => WireMessage {
                    role: "system",
                    content: Some(content.clone()),
                    function_call: None,
                    name: None,
                },
                Turn::User { content } => WireMessage {
                    role: "user",
                    content: Some(content.clone()),
                    function_call: None,
                    name: None,
                },
                Turn::Assistant {
                    content,
                    function_call,
                } => WireMessage {
                    role: "assistant",
                    content: content.clone(),
                    function_call: function_call.as_ref().map(|call| WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    }),
                    name: None,
                },
                Turn::Function { name, content } => WireMessage {
                    role: "function",
                    content: Some(content.clone()),
                    function_call: None,
                    name: Some(name.clone()),
                },
            })
            .collect()
    }
}
