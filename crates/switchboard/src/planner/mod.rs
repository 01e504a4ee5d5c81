//! Plan sources: where a candidate plan for a query comes from.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::message::Message;
use crate::plan::ToolName;
use crate::prompt_template::render_prompt;
use crate::providers::base::Provider;
use crate::providers::errors::ProviderError;
use crate::validate::DEFAULT_MAX_STEPS;

const SYSTEM: &str = "You are a planning controller that outputs ONLY JSON per the instructions.";
const PROMPT: &str = include_str!("../prompts/planner.md");

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Plan generation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Planner prompt failed to render: {0}")]
    Prompt(#[from] minijinja::Error),
}

/// Produces an untrusted, plan-shaped JSON value for a query. The value is
/// validated before anything runs, so implementations need not check it.
#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn generate_plan(&self, query: &str) -> Result<Value, PlannerError>;
}

#[derive(Serialize)]
struct ToolDescription {
    name: &'static str,
    description: &'static str,
}

fn describe(tool: ToolName) -> ToolDescription {
    let description = match tool {
        ToolName::Calculator => {
            "evaluates arithmetic: + - * / ^ **, parentheses, sqrt(), factorials like 5!"
        }
        ToolName::NarrativeMath => "solves grade-school word problems that need arithmetic",
        ToolName::WebSearch => "answers factual questions from live web search results",
        ToolName::Retrieval => "answers from the user's local document index",
    };
    ToolDescription {
        name: tool.as_str(),
        description,
    }
}

/// Asks a chat model for a plan in JSON mode
pub struct LlmPlanner {
    provider: Arc<dyn Provider>,
    max_steps: usize,
}

impl LlmPlanner {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn prompt(&self, query: &str) -> Result<String, PlannerError> {
        let tools: Vec<ToolDescription> = ToolName::ALL.into_iter().map(describe).collect();
        Ok(render_prompt(
            PROMPT,
            json!({ "tools": tools, "max_steps": self.max_steps, "query": query }),
        )?)
    }
}

#[async_trait]
impl PlanSource for LlmPlanner {
    async fn generate_plan(&self, query: &str) -> Result<Value, PlannerError> {
        let prompt = self.prompt(query)?;
        let response = self
            .provider
            .complete_json(SYSTEM, &[Message::user().with_text(prompt)])
            .await?;
        debug!(model = %response.model, plan = %response.data, "model plan");
        Ok(response.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;

    #[test]
    fn test_prompt_lists_tools_and_query() {
        let planner = LlmPlanner::new(Arc::new(MockProvider::new(Vec::<String>::new())));
        let prompt = planner.prompt("Compute 5! and who founded Microsoft?").unwrap();
        for tool in ToolName::ALL {
            assert!(prompt.contains(&format!("- {}: ", tool.as_str())));
        }
        assert!(prompt.contains("at most 4 tool calls"));
        assert!(prompt.contains("\"final_response_instructions\": \"{{step-1}} | {{step-2}}\""));
        assert!(prompt.trim_end().ends_with("Compute 5! and who founded Microsoft?"));
    }

    #[tokio::test]
    async fn test_generate_plan_parses_json() {
        let provider = MockProvider::new([r#"{"steps": [{"id": "step-1", "tool": "calculator", "input": "5!"}]}"#]);
        let planner = LlmPlanner::new(Arc::new(provider.clone())).with_max_steps(2);
        let plan = planner.generate_plan("Compute 5!").await.unwrap();
        assert_eq!(plan["steps"][0]["input"], "5!");

        let prompts = provider.prompts();
        assert_eq!(prompts[0].system, SYSTEM);
        assert!(prompts[0].last_text().contains("at most 2 tool calls"));
    }

    #[tokio::test]
    async fn test_generate_plan_errors() {
        let planner = LlmPlanner::new(Arc::new(MockProvider::new(["not json"])));
        assert!(matches!(
            planner.generate_plan("q").await,
            Err(PlannerError::Provider(ProviderError::ResponseParseError(_)))
        ));

        let failing = MockProvider::new(Vec::<String>::new())
            .then_error(ProviderError::RateLimitExceeded("slow down".to_string()));
        let planner = LlmPlanner::new(Arc::new(failing));
        assert!(planner.generate_plan("q").await.is_err());
    }
}
