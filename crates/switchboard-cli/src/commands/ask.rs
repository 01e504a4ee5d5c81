use std::path::{Path, PathBuf};

use anyhow::Result;
use console::style;
use switchboard::{Controller, OrchestrationResult};
use tracing::{debug, info};

use super::load_settings;

pub async fn handle_ask(
    config: Option<&Path>,
    index: Option<PathBuf>,
    query: &str,
    trace: bool,
    json: bool,
) -> Result<()> {
    let settings = load_settings(config, index)?;
    let controller = Controller::from_settings(&settings)?;
    info!(query, index = %settings.retrieval.index_dir.display(), "answering query");
    let result = controller.orchestrate(query).await;
    debug!(steps = result.trace.len(), "query answered");
    println!("{}", format_result(&result, trace, json)?);
    Ok(())
}

pub fn format_result(result: &OrchestrationResult, trace: bool, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(result)?);
    }
    let mut out = result.final_answer.clone();
    if trace && !result.trace.is_empty() {
        out.push_str(&format!("\n\n{}", style("Trace:").dim()));
        for line in &result.trace {
            out.push_str(&format!("\n  {}", style(line).dim()));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> OrchestrationResult {
        OrchestrationResult {
            final_answer: "120 | Paris".to_string(),
            trace: vec![
                "step-1 -> calculator(\"5!\")".to_string(),
                "step-2 -> web_search(\"capital of France\")".to_string(),
            ],
        }
    }

    #[test]
    fn test_plain_answer() {
        assert_eq!(format_result(&result(), false, false).unwrap(), "120 | Paris");
    }

    #[test]
    fn test_answer_with_trace() {
        console::set_colors_enabled(false);
        let out = format_result(&result(), true, false).unwrap();
        assert_eq!(
            out,
            "120 | Paris\n\nTrace:\n  step-1 -> calculator(\"5!\")\n  step-2 -> web_search(\"capital of France\")"
        );
    }

    #[test]
    fn test_json_output() {
        let out = format_result(&result(), false, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["final_answer"], "120 | Paris");
        assert_eq!(value["trace"][1], "step-2 -> web_search(\"capital of France\")");
    }
}
