//! Server-Sent Events support

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::session::ChatEvent;

/// Convert a session's broadcast stream to an SSE stream, starting with an
/// init snapshot.
pub fn sse_stream(
    init_event: ChatEvent,
    broadcast_rx: tokio::sync::broadcast::Receiver<ChatEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move { Ok(chat_event_to_sse(init_event)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(chat_event_to_sse(event))),
        Err(_) => None, // Skip lagged messages
    });

    let combined = init.chain(broadcasts);

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn chat_event_to_sse(event: ChatEvent) -> Event {
    let (event_type, data) = match event {
        ChatEvent::Init { turns } => (
            "init",
            json!({
                "type": "init",
                "turns": turns
            }),
        ),
        ChatEvent::TextDelta { text } => (
            "text_delta",
            json!({
                "type": "text_delta",
                "text": text
            }),
        ),
        ChatEvent::CallStarted { name } => (
            "call_started",
            json!({
                "type": "call_started",
                "name": name
            }),
        ),
        ChatEvent::CallArgumentsDelta { arguments } => (
            "call_arguments_delta",
            json!({
                "type": "call_arguments_delta",
                "arguments": arguments
            }),
        ),
        ChatEvent::CallFinished { name, ok, result } => (
            "call_finished",
            json!({
                "type": "call_finished",
                "name": name,
                "ok": ok,
                "result": result
            }),
        ),
        ChatEvent::TurnAdded { turn } => (
            "turn",
            json!({
                "type": "turn",
                "turn": turn
            }),
        ),
        ChatEvent::RunCompleted => (
            "run_completed",
            json!({
                "type": "run_completed"
            }),
        ),
        ChatEvent::RunFailed { message } => (
            "run_failed",
            json!({
                "type": "run_failed",
                "message": message
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}
