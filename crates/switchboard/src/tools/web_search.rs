use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{Tool, ToolError};
use crate::message::Message;
use crate::plan::ToolName;
use crate::prompt_template::render_prompt;
use crate::providers::base::Provider;
use crate::providers::utils::handle_response;

pub const NO_RESULTS: &str = "No relevant web results found.";

const SYSTEM: &str = "Answer ONLY the asked question using the SEARCH SNIPPETS. \
    Do not change the entity/topic. Include brief inline citations like [#].";
const PROMPT: &str = include_str!("../prompts/web_answer.md");

fn default_host() -> String {
    "https://api.tavily.com".to_string()
}
fn default_max_results() -> usize {
    5
}
fn default_max_snippets() -> usize {
    6
}
fn default_timeout() -> u64 {
    60
}

/// Settings for a Tavily-compatible search API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_key: None,
            max_results: default_max_results(),
            max_snippets: default_max_snippets(),
            timeout_secs: default_timeout(),
        }
    }
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Number the results as `[i] title: content`, skipping results without
/// content but keeping their position in the numbering.
pub fn format_snippets(results: &[SearchResult], max_snippets: usize) -> String {
    results
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let content = r.content.as_deref().unwrap_or_default().trim();
            if content.is_empty() {
                return None;
            }
            let title = r.title.as_deref().unwrap_or_default().trim();
            Some(format!("[{}] {}: {}", i + 1, title, content))
        })
        .take(max_snippets)
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct WebSearchTool {
    client: Client,
    config: SearchConfig,
    provider: Arc<dyn Provider>,
}

impl WebSearchTool {
    pub fn new(config: SearchConfig, provider: Arc<dyn Provider>) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ToolError::Search(e.to_string()))?;
        Ok(Self {
            client,
            config,
            provider,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|_| self.is_configured())
            .ok_or(ToolError::SearchNotConfigured)?;

        let url = url::Url::parse(&self.config.host)
            .and_then(|base| base.join("search"))
            .map_err(|e| ToolError::Search(format!("Invalid search URL: {e}")))?;
        let payload = json!({
            "api_key": api_key,
            "query": query,
            "max_results": self.config.max_results,
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ToolError::Search(e.to_string()))?;
        let body: Value = handle_response(&payload, response)
            .await
            .map_err(|e| ToolError::Search(e.to_string()))?;
        let parsed: SearchResponse =
            serde_json::from_value(body).map_err(|e| ToolError::Search(e.to_string()))?;
        debug!(query, results = parsed.results.len(), "web search");
        Ok(parsed.results)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> ToolName {
        ToolName::WebSearch
    }

    async fn call(&self, input: &str, context: &str) -> Result<String, ToolError> {
        let results = self.search(input).await?;
        let snippets = format_snippets(&results, self.config.max_snippets);
        if snippets.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        let prompt = render_prompt(
            PROMPT,
            json!({ "question": input, "context": context, "snippets": snippets }),
        )?;
        let response = self
            .provider
            .complete(SYSTEM, &[Message::user().with_text(prompt)])
            .await?;
        Ok(response.message.as_text().trim().to_string())
    }
}
