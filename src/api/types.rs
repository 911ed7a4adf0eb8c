//! API request/response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::Turn;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub system_prompt: Option<String>,
    pub greeting: Option<String>,
    pub context_document: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
