use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Results produced while executing a plan, keyed by step id
pub type StepResults = HashMap<String, String>;

/// The fixed set of tools a plan step may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ToolName {
    Calculator,
    NarrativeMath,
    WebSearch,
    Retrieval,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::Calculator,
        ToolName::NarrativeMath,
        ToolName::WebSearch,
        ToolName::Retrieval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Calculator => "calculator",
            ToolName::NarrativeMath => "narrative_math",
            ToolName::WebSearch => "web_search",
            ToolName::Retrieval => "retrieval",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = UnknownTool;

    /// Accepts the canonical names plus the short aliases planners tend to emit
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "calculator" => Ok(ToolName::Calculator),
            "narrative_math" | "gsm8k" => Ok(ToolName::NarrativeMath),
            "web_search" | "web" => Ok(ToolName::WebSearch),
            "retrieval" | "rag" => Ok(ToolName::Retrieval),
            _ => Err(UnknownTool(s.to_string())),
        }
    }
}

impl TryFrom<String> for ToolName {
    type Error = UnknownTool;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ToolName> for String {
    fn from(tool: ToolName) -> Self {
        tool.as_str().to_string()
    }
}

/// One tool invocation inside a plan.
///
/// `depends_on` is carried for compatibility with model-generated plans but
/// is never consulted: steps always run in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub tool: ToolName,
    pub input: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Step {
    pub fn new<I: Into<String>, S: Into<String>>(id: I, tool: ToolName, input: S) -> Self {
        Self {
            id: id.into(),
            tool,
            input: input.into(),
            depends_on: Vec::new(),
        }
    }

    /// The `{{id}}` placeholder that refers to this step in a response template
    pub fn placeholder(&self) -> String {
        format!("{{{{{}}}}}", self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(alias = "plan")]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub final_response_instructions: String,
    #[serde(default)]
    pub notes_on_false_premises: Option<String>,
}

impl Plan {
    pub fn new(steps: Vec<Step>, final_response_instructions: impl Into<String>) -> Self {
        Self {
            steps,
            final_response_instructions: final_response_instructions.into(),
            notes_on_false_premises: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes_on_false_premises = Some(note.into());
        self
    }

    /// All step inputs joined together, handed to tools as disambiguating context
    pub fn combined_inputs(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.input.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The outcome of one orchestration cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub final_answer: String,
    pub trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_name_aliases() {
        assert_eq!("calculator".parse::<ToolName>(), Ok(ToolName::Calculator));
        assert_eq!("gsm8k".parse::<ToolName>(), Ok(ToolName::NarrativeMath));
        assert_eq!("narrative-math".parse::<ToolName>(), Ok(ToolName::NarrativeMath));
        assert_eq!(" Web ".parse::<ToolName>(), Ok(ToolName::WebSearch));
        assert_eq!("RAG".parse::<ToolName>(), Ok(ToolName::Retrieval));
        assert!("shell".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_plan_deserializes_with_plan_alias() {
        let value = json!({
            "plan": [
                {"id": "step-1", "tool": "calculator", "input": "2+2"},
                {"id": "step-2", "tool": "web", "input": "capital of France", "depends_on": ["step-1"]}
            ],
            "final_response_instructions": "{{step-1}} and {{step-2}}"
        });
        let plan: Plan = serde_json::from_value(value).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].tool, ToolName::WebSearch);
        assert_eq!(plan.steps[1].depends_on, vec!["step-1".to_string()]);
        assert_eq!(plan.notes_on_false_premises, None);
    }

    #[test]
    fn test_plan_serializes_canonical_tool_names() {
        let plan = Plan::new(vec![Step::new("step-1", ToolName::NarrativeMath, "x")], "");
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["steps"][0]["tool"], "narrative_math");
    }

    #[test]
    fn test_placeholder_and_combined_inputs() {
        let plan = Plan::new(
            vec![
                Step::new("step-1", ToolName::Calculator, "5!"),
                Step::new("step-2", ToolName::WebSearch, "who founded Rust"),
            ],
            "",
        );
        assert_eq!(plan.steps[0].placeholder(), "{{step-1}}");
        assert_eq!(plan.combined_inputs(), "5! who founded Rust");
    }
}
