//! HTTP handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use super::sse::sse_stream;
use super::types::{
    CreateSessionRequest, ErrorResponse, PostMessageRequest, SessionResponse, StatusResponse,
};
use super::AppState;
use crate::llm::SamplingParams;
use crate::session::{ChatEvent, SessionHandle, SessionInput, SessionOptions};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/messages", post(post_message))
        .route("/api/sessions/:id/cancel", post(cancel_run))
        .route("/api/sessions/:id/reset", post(reset_session))
        .route("/api/sessions/:id/events", get(events))
        .with_state(state)
}

fn session_response(handle: &SessionHandle) -> SessionResponse {
    SessionResponse {
        id: handle.id.clone(),
        created_at: handle.created_at,
        turns: handle.snapshot(),
    }
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("session not found: {id}"),
        }),
    )
        .into_response()
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Response {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let options = SessionOptions {
        system_prompt: request.system_prompt,
        greeting: request.greeting,
        context_document: request.context_document,
        sampling: SamplingParams {
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
        },
    };

    let handle = state.sessions.create(options).await;
    (StatusCode::CREATED, Json(session_response(&handle))).into_response()
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.get(&id).await {
        Some(handle) => Json(session_response(&handle)).into_response(),
        None => not_found(&id),
    }
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.sessions.remove(&id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(&id)
    }
}

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PostMessageRequest>,
) -> Response {
    let Some(handle) = state.sessions.get(&id).await else {
        return not_found(&id);
    };

    match handle
        .send(SessionInput::UserMessage { text: request.text })
        .await
    {
        Ok(()) => (StatusCode::ACCEPTED, Json(StatusResponse { status: "queued" })).into_response(),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse { error: e }),
        )
            .into_response(),
    }
}

async fn cancel_run(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(handle) = state.sessions.get(&id).await else {
        return not_found(&id);
    };

    let status = if handle.cancel_current_run() {
        "cancelling"
    } else {
        "idle"
    };
    Json(StatusResponse { status }).into_response()
}

async fn reset_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(handle) = state.sessions.get(&id).await else {
        return not_found(&id);
    };

    match handle.send(SessionInput::Reset).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(StatusResponse { status: "queued" })).into_response(),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse { error: e }),
        )
            .into_response(),
    }
}

async fn events(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(handle) = state.sessions.get(&id).await else {
        return not_found(&id);
    };

    let init = ChatEvent::Init {
        turns: handle.snapshot(),
    };
    sse_stream(init, handle.subscribe()).into_response()
}
