//! chatloop - streaming chat-bot backend
//!
//! A Rust service implementing a per-session conversation transcript, a
//! streaming response accumulator, and a bounded tool-call orchestration
//! loop over an OpenAI-compatible completion API.

mod api;
mod llm;
mod orchestrator;
mod session;
mod tools;
mod transcript;

use api::{create_router, AppState};
use llm::{LlmConfig, LlmService, OpenAiService};
use session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tools::ToolRegistry;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatloop=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("CHATLOOP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let config = LlmConfig::from_env();
    if config.api_key.is_none() {
        tracing::warn!("No OPENAI_API_KEY configured. Model requests will fail until one is set.");
    }
    let llm: Arc<dyn LlmService> = Arc::new(OpenAiService::new(
        config.api_key.unwrap_or_default(),
        config.model,
        config.api_base.as_deref(),
    ));
    tracing::info!(model = %llm.model_id(), "LLM service initialized");

    let tools = Arc::new(ToolRegistry::standard());
    let state = AppState::new(SessionManager::new(llm, tools));

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("chatloop server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
