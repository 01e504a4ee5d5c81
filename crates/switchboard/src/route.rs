//! Assigns each atomic sub-query to exactly one tool.
//!
//! Rules are evaluated top to bottom and the first match wins. Structural
//! signals (explicit arithmetic, an explicit document reference) sit above
//! keyword cues, and anything unmatched goes to web search.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::cues::{is_narrative_math, DOC_PREFACE, SQUARE_ROOT};
use crate::plan::ToolName;

lazy_static! {
    static ref FACTORIAL: Regex = Regex::new(r"^\d+\s*!\s*$").unwrap();
    static ref ARITHMETIC_OPERATOR: Regex = Regex::new(r"[\+\-\*/\^]").unwrap();
    static ref CARET_POWER: Regex = Regex::new(r"(\d+)\s*\^\s*(\d+)").unwrap();
    static ref SQRT_CALL: Regex = Regex::new(r"(?i)sqrt\s*\(").unwrap();
    static ref LETTER: Regex = Regex::new(r"[A-Za-z]").unwrap();
    static ref MATH_ONLY: Regex = Regex::new(r"^[0-9\.\s\+\-\*/\(\)!\^]+$").unwrap();
    static ref DEFINITION: Regex =
        Regex::new(r"(?i)\b(what is|what’s|what's|define|definition|explain)\b").unwrap();
    static ref WORLD_FACT: Regex = Regex::new(
        r"(?i)(current|who|ceo|prime minister|president|secretary-general|capital|population|winner|founded|founder)"
    )
    .unwrap();
}

/// The tool chosen for a chunk and the input that tool should receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub tool: ToolName,
    pub input: String,
}

impl Route {
    fn new(tool: ToolName, input: impl Into<String>) -> Self {
        Self {
            tool,
            input: input.into(),
        }
    }
}

type Rule = fn(&str) -> Option<Route>;

const RULES: &[(&str, Rule)] = &[
    ("factorial", factorial),
    ("square_root", square_root),
    ("pure_math", pure_math),
    ("narrative_math", narrative_math),
    ("document_reference", document_reference),
    ("definition", definition),
    ("world_fact", world_fact),
];

/// Route a chunk to a tool. Total: every input yields exactly one route.
pub fn route(chunk: &str) -> Route {
    let chunk = chunk.trim();
    for (name, rule) in RULES {
        if let Some(route) = rule(chunk) {
            debug!(rule = *name, tool = %route.tool, input = %route.input, "routed chunk");
            return route;
        }
    }
    debug!(rule = "default", tool = %ToolName::WebSearch, input = chunk, "routed chunk");
    Route::new(ToolName::WebSearch, chunk)
}

fn factorial(chunk: &str) -> Option<Route> {
    FACTORIAL
        .is_match(chunk)
        .then(|| Route::new(ToolName::Calculator, chunk))
}

fn square_root(chunk: &str) -> Option<Route> {
    let caps = SQUARE_ROOT.captures(chunk)?;
    Some(Route::new(ToolName::Calculator, format!("sqrt({})", &caps[1])))
}

/// The calculator receives the original text; rewriting here only decides
/// whether the chunk is arithmetic at all.
fn pure_math(chunk: &str) -> Option<Route> {
    if !ARITHMETIC_OPERATOR.is_match(chunk) {
        return None;
    }
    let normalized = chunk.replace(',', "");
    let normalized = SQUARE_ROOT.replace_all(&normalized, "sqrt(${1})");
    let normalized = CARET_POWER.replace_all(&normalized, "${1}**${2}");
    let without_sqrt = SQRT_CALL.replace_all(&normalized, "(");
    if LETTER.is_match(&without_sqrt) || !MATH_ONLY.is_match(&without_sqrt) {
        return None;
    }
    Some(Route::new(ToolName::Calculator, chunk))
}

fn narrative_math(chunk: &str) -> Option<Route> {
    is_narrative_math(chunk).then(|| Route::new(ToolName::NarrativeMath, chunk))
}

fn document_reference(chunk: &str) -> Option<Route> {
    if !DOC_PREFACE.is_match(chunk) {
        return None;
    }
    let stripped = DOC_PREFACE.replace(chunk, "");
    let stripped = stripped.trim();
    let input = if stripped.is_empty() { chunk } else { stripped };
    Some(Route::new(ToolName::Retrieval, input))
}

fn definition(chunk: &str) -> Option<Route> {
    DEFINITION
        .is_match(chunk)
        .then(|| Route::new(ToolName::WebSearch, chunk))
}

fn world_fact(chunk: &str) -> Option<Route> {
    WORLD_FACT
        .is_match(chunk)
        .then(|| Route::new(ToolName::WebSearch, chunk))
}
