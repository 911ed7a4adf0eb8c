//! Web search tool backed by the DuckDuckGo instant-answer API

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{Tool, ToolOutput};

const API_URL: &str = "https://api.duckduckgo.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_TOPICS: usize = 5;

/// Search the web via DuckDuckGo's keyless JSON API.
pub struct WebSearchTool {
    client: Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> String {
        "Search the web. Useful for current events or answering specific factual questions."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_query": {
                    "type": "string",
                    "description": "The web search query to run",
                },
            },
            "required": ["search_query"],
        })
    }

    async fn run(&self, args: Value) -> ToolOutput {
        let query = match args.get("search_query").and_then(Value::as_str) {
            Some(q) if !q.is_empty() => q.to_string(),
            _ => return ToolOutput::error("'search_query' parameter is required"),
        };

        tracing::debug!(query = %query, "running web search");

        let response = match self
            .client
            .get(API_URL)
            .query(&[
                ("q", query.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ToolOutput::error(format!("Web search failed: {e}")),
        };

        if !response.status().is_success() {
            return ToolOutput::error(format!(
                "Web search returned HTTP {}",
                response.status()
            ));
        }

        match response.json::<Value>().await {
            Ok(data) => {
                let summary = summarize_results(&data);
                if summary.is_empty() {
                    ToolOutput::success(format!("No results for: {query}"))
                } else {
                    ToolOutput::success(summary)
                }
            }
            Err(e) => ToolOutput::error(format!("Error parsing search results: {e}")),
        }
    }
}

/// Collapse an instant-answer payload into a compact text summary: the
/// abstract or direct answer first, then related-topic snippets.
fn summarize_results(data: &Value) -> String {
    let mut lines = Vec::new();

    for key in ["AbstractText", "Answer", "Definition"] {
        if let Some(text) = data.get(key).and_then(Value::as_str) {
            if !text.is_empty() {
                lines.push(text.to_string());
                break;
            }
        }
    }

    if let Some(topics) = data.get("RelatedTopics").and_then(Value::as_array) {
        for topic in topics.iter().take(MAX_TOPICS) {
            if let Some(text) = topic.get("Text").and_then(Value::as_str) {
                if !text.is_empty() {
                    lines.push(format!("- {text}"));
                }
            }
        }
    }

    lines.join("\n")
}
