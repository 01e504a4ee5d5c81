use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};

use super::{Tool, ToolError};
use crate::index::DocumentIndex;
use crate::message::Message;
use crate::plan::ToolName;
use crate::prompt_template::render_prompt;
use crate::providers::base::Provider;

pub const DEFAULT_TOP_K: usize = 4;
pub const NO_LOCAL_ANSWER: &str = "I don't know based on the local documents.";

const SYSTEM: &str =
    "You answer strictly from the provided CONTEXT. If unknown, say you don't know.";
const PROMPT: &str = include_str!("../prompts/retrieval_answer.md");

lazy_static! {
    static ref DONT_KNOW: Regex = Regex::new(r"(?i)\bi (do not|don't) know\b").unwrap();
}

/// Answers from the local document index. When the documents have nothing
/// useful it hands the question to the web search tool, if one is attached.
pub struct RetrievalTool {
    index: Arc<dyn DocumentIndex>,
    provider: Arc<dyn Provider>,
    web_fallback: Option<Arc<dyn Tool>>,
    top_k: usize,
}

impl RetrievalTool {
    pub fn new(index: Arc<dyn DocumentIndex>, provider: Arc<dyn Provider>) -> Self {
        Self {
            index,
            provider,
            web_fallback: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_web_fallback(mut self, web: Arc<dyn Tool>) -> Self {
        self.web_fallback = Some(web);
        self
    }

    async fn fall_back(
        &self,
        input: &str,
        context: &str,
        local: String,
    ) -> Result<String, ToolError> {
        match &self.web_fallback {
            Some(web) => {
                info!(question = input, "local documents had no answer, using web search");
                web.call(input, context).await
            }
            None => Ok(local),
        }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> ToolName {
        ToolName::Retrieval
    }

    async fn call(&self, input: &str, context: &str) -> Result<String, ToolError> {
        let hits = self.index.search(input, self.top_k).await?;
        let contexts: Vec<&str> = hits
            .iter()
            .map(|h| h.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect();
        debug!(question = input, contexts = contexts.len(), "retrieved chunks");

        if contexts.is_empty() {
            return self
                .fall_back(input, context, NO_LOCAL_ANSWER.to_string())
                .await;
        }

        let prompt = render_prompt(
            PROMPT,
            json!({ "context": contexts.join("\n---\n"), "question": input }),
        )?;
        let response = self
            .provider
            .complete(SYSTEM, &[Message::user().with_text(prompt)])
            .await?;
        let answer = response.message.as_text().trim().to_string();

        if DONT_KNOW.is_match(&answer) {
            return self.fall_back(input, context, answer).await;
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ChunkMeta, Hit, IndexError};
    use crate::providers::mock::MockProvider;
    use std::path::PathBuf;

    struct FixedIndex(Vec<&'static str>);

    #[async_trait]
    impl DocumentIndex for FixedIndex {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<Hit>, IndexError> {
            Ok(self
                .0
                .iter()
                .take(k)
                .map(|t| Hit {
                    text: t.to_string(),
                    meta: ChunkMeta {
                        source: "doc.md".to_string(),
                    },
                    score: 1.0,
                })
                .collect())
        }
    }

    struct MissingIndex;

    #[async_trait]
    impl DocumentIndex for MissingIndex {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Hit>, IndexError> {
            Err(IndexError::Missing(PathBuf::from("data/index")))
        }
    }

    struct StubWeb;

    #[async_trait]
    impl Tool for StubWeb {
        fn name(&self) -> ToolName {
            ToolName::WebSearch
        }

        async fn call(&self, input: &str, context: &str) -> Result<String, ToolError> {
            Ok(format!("web: {input} ({context})"))
        }
    }

    #[tokio::test]
    async fn test_answers_from_context() {
        let provider = MockProvider::new(["Refunds are accepted within 30 days."]);
        let tool = RetrievalTool::new(
            Arc::new(FixedIndex(vec!["Refund window: 30 days.", "Ship weekly."])),
            Arc::new(provider.clone()),
        );
        let answer = tool.call("what is our refund policy?", "").await.unwrap();
        assert_eq!(answer, "Refunds are accepted within 30 days.");

        let prompts = provider.prompts();
        assert_eq!(prompts[0].system, SYSTEM);
        let user = prompts[0].last_text();
        assert!(user.contains("Refund window: 30 days.\n---\nShip weekly."));
        assert!(user.contains("QUESTION: what is our refund policy?"));
    }

    #[tokio::test]
    async fn test_top_k_limits_contexts() {
        let provider = MockProvider::new(["ok"]);
        let tool = RetrievalTool::new(
            Arc::new(FixedIndex(vec!["a", "b", "c"])),
            Arc::new(provider.clone()),
        )
        .with_top_k(1);
        tool.call("q", "").await.unwrap();
        assert!(!provider.prompts()[0].last_text().contains("---"));
    }

    #[tokio::test]
    async fn test_empty_index_without_web() {
        let provider = MockProvider::new(["unused"]);
        let tool = RetrievalTool::new(Arc::new(FixedIndex(vec![])), Arc::new(provider.clone()));
        assert_eq!(tool.call("refund policy", "").await.unwrap(), NO_LOCAL_ANSWER);
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_falls_back_to_web() {
        let tool = RetrievalTool::new(
            Arc::new(FixedIndex(vec![])),
            Arc::new(MockProvider::new(["unused"])),
        )
        .with_web_fallback(Arc::new(StubWeb));
        assert_eq!(
            tool.call("refund policy", "refund policy").await.unwrap(),
            "web: refund policy (refund policy)"
        );
    }

    #[tokio::test]
    async fn test_dont_know_answer() {
        let without_web = RetrievalTool::new(
            Arc::new(FixedIndex(vec!["Unrelated text."])),
            Arc::new(MockProvider::new(["Sorry, I don't know."])),
        );
        assert_eq!(
            without_web.call("refund policy", "").await.unwrap(),
            "Sorry, I don't know."
        );

        let with_web = RetrievalTool::new(
            Arc::new(FixedIndex(vec!["Unrelated text."])),
            Arc::new(MockProvider::new(["I do not know from this context."])),
        )
        .with_web_fallback(Arc::new(StubWeb));
        assert_eq!(
            with_web.call("refund policy", "").await.unwrap(),
            "web: refund policy ()"
        );
    }

    #[tokio::test]
    async fn test_missing_index_is_actionable() {
        let tool = RetrievalTool::new(
            Arc::new(MissingIndex),
            Arc::new(MockProvider::new(["unused"])),
        )
        .with_web_fallback(Arc::new(StubWeb));
        let err = tool.call("refund policy", "").await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Index missing in data/index. Build it with:"));
    }
}
