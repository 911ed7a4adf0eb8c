//! Property-based tests for the streaming response accumulator

use super::accumulator::{ResponseAccumulator, StreamOutcome};
use super::types::StreamFragment;
use proptest::prelude::*;

proptest! {
    /// The finalized text equals the ordered concatenation of every text
    /// delta, for any fragment sequence carrying only text.
    #[test]
    fn text_only_streams_concatenate(deltas in proptest::collection::vec(".*", 0..16)) {
        let mut acc = ResponseAccumulator::new();
        for delta in &deltas {
            acc.absorb(StreamFragment::text(delta.clone()));
        }
        let expected: String = deltas.concat();
        prop_assert_eq!(acc.text(), expected.as_str());

        match acc.finish() {
            StreamOutcome::Text(text) => prop_assert_eq!(text, expected),
            StreamOutcome::Empty => prop_assert!(expected.is_empty()),
            StreamOutcome::FunctionCall(call) => {
                return Err(TestCaseError::fail(format!("unexpected call: {call:?}")));
            }
        }
    }

    /// With a name appearing once and N argument fragments, the finalized
    /// arguments equal the ordered concatenation of the N fragments.
    #[test]
    fn argument_fragments_concatenate(
        name in "[a-z_]{1,16}",
        args in proptest::collection::vec(".*", 0..16),
    ) {
        let mut acc = ResponseAccumulator::new();
        acc.absorb(StreamFragment::call_name(name.clone()));
        for delta in &args {
            acc.absorb(StreamFragment::call_arguments(delta.clone()));
        }
        prop_assert!(acc.text().is_empty());

        let expected: String = args.concat();
        match acc.finish() {
            StreamOutcome::FunctionCall(call) => {
                prop_assert_eq!(call.name, name);
                prop_assert_eq!(call.arguments, expected);
            }
            other => {
                return Err(TestCaseError::fail(format!("expected call, got {other:?}")));
            }
        }
    }

    /// A function call always wins over text accumulated in the same stream.
    #[test]
    fn call_wins_over_text(
        texts in proptest::collection::vec(".+", 1..8),
        name in "[a-z_]{1,16}",
    ) {
        let mut acc = ResponseAccumulator::new();
        for delta in &texts {
            acc.absorb(StreamFragment::text(delta.clone()));
        }
        acc.absorb(StreamFragment::call_name(name));
        prop_assert!(matches!(acc.finish(), StreamOutcome::FunctionCall(_)));
    }
}
