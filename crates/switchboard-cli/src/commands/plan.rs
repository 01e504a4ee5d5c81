use anyhow::Result;
use switchboard::controller::fallback_plan;

/// Decomposition and routing only: no settings, no network
pub fn handle_plan(query: &str) -> Result<()> {
    let plan = fallback_plan(query);
    tracing::debug!(query, steps = plan.steps.len(), "built fallback plan");
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
