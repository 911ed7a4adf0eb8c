//! Streaming response accumulator
//!
//! Folds the fragment sequence of one model response into exactly one
//! finalized outcome: plain text or a function-call request. The running
//! partial view is observable after every absorbed fragment so callers can
//! render output as it arrives.

use super::types::{CallDelta, StreamFragment};
use crate::transcript::FunctionCall;

/// In-flight function call being assembled from streamed fragments.
///
/// The name is set once by the first name fragment (later name fragments are
/// ignored); `arguments` is the in-order concatenation of every argument
/// fragment so far and is not guaranteed to be valid JSON until the stream
/// ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCall {
    pub name: String,
    pub arguments: String,
}

/// Finalized result of one streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Text(String),
    FunctionCall(FunctionCall),
    /// The stream ended carrying neither text nor a call.
    Empty,
}

/// Accumulates the fragments of one streamed response.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
    call: Option<PendingCall>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one fragment into the running state.
    pub fn absorb(&mut self, fragment: StreamFragment) {
        if let Some(delta) = fragment.text {
            self.text.push_str(&delta);
        }
        match fragment.call {
            Some(CallDelta::Name(name)) => {
                let call = self.call.get_or_insert_with(PendingCall::default);
                if call.name.is_empty() {
                    call.name = name;
                }
            }
            Some(CallDelta::Arguments(delta)) => {
                self.call
                    .get_or_insert_with(PendingCall::default)
                    .arguments
                    .push_str(&delta);
            }
            None => {}
        }
    }

    /// Running text accumulated so far.
    #[allow(dead_code)] // Partial view for callers rendering live output
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Function call accumulated so far, if any fragment carried one.
    #[allow(dead_code)] // Partial view for callers rendering live output
    pub fn pending_call(&self) -> Option<&PendingCall> {
        self.call.as_ref()
    }

    /// Finalize once the stream is exhausted. A function call takes
    /// precedence over any text accumulated in the same stream.
    pub fn finish(self) -> StreamOutcome {
        if let Some(call) = self.call {
            return StreamOutcome::FunctionCall(FunctionCall {
                name: call.name,
                arguments: call.arguments,
            });
        }
        if self.text.is_empty() {
            StreamOutcome::Empty
        } else {
            StreamOutcome::Text(self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_deltas_concatenate_in_order() {
        let mut acc = ResponseAccumulator::new();
        acc.absorb(StreamFragment::text("It's "));
        acc.absorb(StreamFragment::text("sunny"));
        acc.absorb(StreamFragment::text("."));
        assert_eq!(acc.text(), "It's sunny.");
        assert_eq!(
            acc.finish(),
            StreamOutcome::Text("It's sunny.".to_string())
        );
    }

    #[test]
    fn partial_text_is_visible_after_every_fragment() {
        let mut acc = ResponseAccumulator::new();
        acc.absorb(StreamFragment::text("He"));
        assert_eq!(acc.text(), "He");
        acc.absorb(StreamFragment::text("llo"));
        assert_eq!(acc.text(), "Hello");
    }

    #[test]
    fn call_name_then_argument_fragments() {
        let mut acc = ResponseAccumulator::new();
        acc.absorb(StreamFragment::call_name("web_search"));
        acc.absorb(StreamFragment::call_arguments("{\"search_query\""));
        acc.absorb(StreamFragment::call_arguments(":\"weather\"}"));

        let pending = acc.pending_call().unwrap();
        assert_eq!(pending.name, "web_search");
        assert_eq!(pending.arguments, "{\"search_query\":\"weather\"}");

        assert_eq!(
            acc.finish(),
            StreamOutcome::FunctionCall(FunctionCall {
                name: "web_search".to_string(),
                arguments: "{\"search_query\":\"weather\"}".to_string(),
            })
        );
    }

    #[test]
    fn first_call_name_wins() {
        let mut acc = ResponseAccumulator::new();
        acc.absorb(StreamFragment::call_name("web_search"));
        acc.absorb(StreamFragment::call_name("other"));
        assert_eq!(acc.pending_call().unwrap().name, "web_search");
    }

    #[test]
    fn function_call_takes_precedence_over_text() {
        let mut acc = ResponseAccumulator::new();
        acc.absorb(StreamFragment::text("Let me check that"));
        acc.absorb(StreamFragment::call_name("web_search"));
        acc.absorb(StreamFragment::call_arguments("{}"));
        assert!(matches!(acc.finish(), StreamOutcome::FunctionCall(_)));
    }

    #[test]
    fn empty_stream_finalizes_empty() {
        assert_eq!(ResponseAccumulator::new().finish(), StreamOutcome::Empty);
    }

    #[test]
    fn arguments_without_name_accumulate_under_empty_name() {
        let mut acc = ResponseAccumulator::new();
        acc.absorb(StreamFragment::call_arguments("{\"x\":1}"));
        match acc.finish() {
            StreamOutcome::FunctionCall(call) => {
                assert!(call.name.is_empty());
                assert_eq!(call.arguments, "{\"x\":1}");
            }
            other => panic!("expected function call, got {other:?}"),
        }
    }
}
