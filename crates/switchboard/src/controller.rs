use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::Settings;
use crate::decompose::decompose;
use crate::execute::PlanExecutor;
use crate::index::EmbeddedIndex;
use crate::plan::{OrchestrationResult, Plan, Step};
use crate::planner::{LlmPlanner, PlanSource};
use crate::providers::base::Provider;
use crate::providers::embeddings::OpenAiEmbedder;
use crate::providers::openai::OpenAiProvider;
use crate::render::render;
use crate::route::route;
use crate::tools::{
    CalculatorTool, NarrativeMathTool, RetrievalTool, Tool, Toolbox, WebSearchTool,
};
use crate::validate::PlanValidator;

/// Composition root for one request/response cycle: plan, validate, execute
/// and render. Holds no request state, so one controller can serve
/// concurrent queries.
pub struct Controller {
    planner: Arc<dyn PlanSource>,
    validator: PlanValidator,
    executor: PlanExecutor,
}

impl Controller {
    pub fn new(planner: Arc<dyn PlanSource>, validator: PlanValidator, toolbox: Toolbox) -> Self {
        Self {
            planner,
            validator,
            executor: PlanExecutor::new(toolbox),
        }
    }

    /// Wire the OpenAI-compatible provider, the on-disk index and the four
    /// tools from settings. Retrieval only falls back to the web when a
    /// search key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider: Arc<dyn Provider> = Arc::new(OpenAiProvider::from_config(
            settings.provider.chat_config(),
            settings.provider.model_config(),
        )?);
        let embedder = Arc::new(OpenAiEmbedder::new(
            settings.embedding_config(),
            settings.retrieval.embedding_model.clone(),
        )?);
        let index = Arc::new(EmbeddedIndex::new(&settings.retrieval.index_dir, embedder));

        let web: Arc<dyn Tool> = Arc::new(WebSearchTool::new(
            settings.search.clone(),
            Arc::clone(&provider),
        )?);
        let mut retrieval =
            RetrievalTool::new(index, Arc::clone(&provider)).with_top_k(settings.retrieval.top_k);
        if settings.search.is_configured() {
            retrieval = retrieval.with_web_fallback(Arc::clone(&web));
        }

        let toolbox = Toolbox::new()
            .with_tool(Arc::new(CalculatorTool))
            .with_tool(Arc::new(NarrativeMathTool::new(Arc::clone(&provider))))
            .with_tool(web)
            .with_tool(Arc::new(retrieval));

        let planner =
            LlmPlanner::new(provider).with_max_steps(settings.validator.max_steps);
        Ok(Self::new(
            Arc::new(planner),
            settings.validator.validator(),
            toolbox,
        ))
    }

    /// Answer one query. Never fails: planning problems fall back to the
    /// deterministic plan and tool failures come back as step text.
    #[tracing::instrument(skip(self))]
    pub async fn orchestrate(&self, query: &str) -> OrchestrationResult {
        let query = query.trim();
        if query.is_empty() {
            return OrchestrationResult {
                final_answer: String::new(),
                trace: Vec::new(),
            };
        }

        let plan = self.plan(query).await;
        let (results, trace) = self.executor.execute(&plan).await;
        OrchestrationResult {
            final_answer: render(&plan, &results),
            trace,
        }
    }

    /// The plan that will run for `query`: the model's plan when it passes
    /// validation, otherwise the fallback plan.
    pub async fn plan(&self, query: &str) -> Plan {
        match self.planner.generate_plan(query).await {
            Ok(raw) => match self.validator.validate(query, &raw) {
                Ok(plan) => {
                    info!(steps = plan.steps.len(), "using model plan");
                    return plan;
                }
                Err(rejection) => info!(reason = %rejection, "model plan rejected"),
            },
            Err(e) => info!(error = %e, "plan generation failed"),
        }
        info!("using fallback plan");
        fallback_plan(query)
    }
}

/// Build a plan without any model: decompose the query and route each piece.
/// Steps are `step-1`, `step-2`, ... and the template joins every step's
/// placeholder with `" | "`.
pub fn fallback_plan(query: &str) -> Plan {
    let query = query.trim();
    let mut pieces = decompose(query);
    if pieces.is_empty() && !query.is_empty() {
        pieces.push(query.to_string());
    }

    let steps: Vec<Step> = pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let routed = route(piece);
            Step::new(format!("step-{}", i + 1), routed.tool, routed.input)
        })
        .collect();
    debug!(steps = steps.len(), "built fallback plan");

    let template = steps
        .iter()
        .map(Step::placeholder)
        .collect::<Vec<_>>()
        .join(" | ");
    Plan::new(steps, template)
}
