//! The tools a plan step can invoke.

pub mod calculator;
pub mod narrative_math;
pub mod retrieval;
pub mod web_search;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::index::IndexError;
use crate::plan::ToolName;
use crate::providers::errors::ProviderError;

pub use calculator::{CalcError, CalculatorTool};
pub use narrative_math::NarrativeMathTool;
pub use retrieval::RetrievalTool;
pub use web_search::{SearchConfig, WebSearchTool};

/// Failures a tool can report. The display text of each variant is what the
/// user sees in place of the step's answer.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Calculator error: {0}")]
    Calculator(#[from] CalcError),

    #[error("(no numeric answer parsed)")]
    NoNumericAnswer,

    #[error("Web search not configured (missing TAVILY_API_KEY).")]
    SearchNotConfigured,

    #[error("Web search failed: {0}")]
    Search(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error("(unknown tool: {0})")]
    NotRegistered(ToolName),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// Run the tool on `input`. `context` carries the inputs of the whole
    /// plan so tools that consult a model can stay on topic.
    async fn call(&self, input: &str, context: &str) -> Result<String, ToolError>;
}

/// The set of tools available to the executor, one per [`ToolName`]
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous one
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    pub async fn call(
        &self,
        name: ToolName,
        input: &str,
        context: &str,
    ) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or(ToolError::NotRegistered(name))?;
        tool.call(input, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> ToolName {
            ToolName::WebSearch
        }

        async fn call(&self, input: &str, context: &str) -> Result<String, ToolError> {
            Ok(format!("{input} [{context}]"))
        }
    }

    #[tokio::test]
    async fn test_toolbox_dispatches_by_name() {
        let toolbox = Toolbox::new()
            .with_tool(Arc::new(Echo))
            .with_tool(Arc::new(CalculatorTool));

        let out = toolbox.call(ToolName::WebSearch, "q", "ctx").await.unwrap();
        assert_eq!(out, "q [ctx]");
        let out = toolbox.call(ToolName::Calculator, "2+2", "").await.unwrap();
        assert_eq!(out, "4");
    }

    #[tokio::test]
    async fn test_toolbox_missing_tool() {
        let err = Toolbox::new()
            .call(ToolName::Retrieval, "q", "")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "(unknown tool: retrieval)");
    }

    #[test]
    fn test_in_band_messages() {
        assert_eq!(
            ToolError::SearchNotConfigured.to_string(),
            "Web search not configured (missing TAVILY_API_KEY)."
        );
        assert_eq!(
            ToolError::NoNumericAnswer.to_string(),
            "(no numeric answer parsed)"
        );
    }
}
