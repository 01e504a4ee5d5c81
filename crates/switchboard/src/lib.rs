pub mod config;
pub mod controller;
mod cues;
pub mod decompose;
pub mod execute;
pub mod index;
pub mod ingest;
pub mod message;
pub mod model;
pub mod plan;
pub mod planner;
mod prompt_template;
pub mod providers;
pub mod render;
pub mod route;
pub mod tools;
pub mod validate;

pub use controller::Controller;
pub use message::Message;
pub use model::ModelConfig;
pub use plan::{OrchestrationResult, Plan, Step, ToolName};
