use tracing::{debug, warn};

use crate::plan::{Plan, StepResults};
use crate::tools::Toolbox;

/// Runs plan steps against the toolbox, strictly in declaration order.
///
/// `depends_on` is not consulted: later steps never see earlier results, so
/// declaration order is a sufficient schedule.
#[derive(Clone, Default)]
pub struct PlanExecutor {
    toolbox: Toolbox,
}

impl PlanExecutor {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }

    /// Execute every step and return the results keyed by step id together
    /// with a `id -> tool("input")` trace line per step. A failing tool
    /// contributes its error text as the step result; execution continues.
    pub async fn execute(&self, plan: &Plan) -> (StepResults, Vec<String>) {
        let context = plan.combined_inputs();
        let mut results = StepResults::new();
        let mut trace = Vec::with_capacity(plan.steps.len());

        for step in &plan.steps {
            let output = match self.toolbox.call(step.tool, &step.input, &context).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(step = %step.id, tool = %step.tool, error = %e, "tool failed");
                    e.to_string()
                }
            };
            debug!(step = %step.id, tool = %step.tool, output = %output, "step finished");
            results.insert(step.id.clone(), output);
            trace.push(format!("{} -> {}(\"{}\")", step.id, step.tool, step.input));
        }

        (results, trace)
    }
}
