use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::plan::{Plan, StepResults};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{([^{}]+)\}\}").unwrap();
}

/// Expand the plan's response template with step results.
///
/// An empty template falls back to the non-empty results joined with `" | "`
/// in plan order. Placeholders without a matching result are left verbatim.
/// Substitution is a single scan of the template, so placeholders that appear
/// inside a step result are never expanded.
pub fn render(plan: &Plan, results: &StepResults) -> String {
    let template = plan.final_response_instructions.trim();
    let mut answer = if template.is_empty() {
        plan.steps
            .iter()
            .filter_map(|step| results.get(&step.id))
            .filter(|text| !text.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" | ")
    } else {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match results.get(&caps[1]) {
                Some(text) => text.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    };

    if let Some(note) = plan
        .notes_on_false_premises
        .as_deref()
        .map(str::trim)
        .filter(|note| !note.is_empty())
    {
        answer.push_str("\n\nNote: ");
        answer.push_str(note);
    }
    answer
}
