//! # Agents
//!
//! LLM-backed adapters driven by the orchestrator.
//!
//! ## Agents
//!
//! - `Planner` - request to [`Plan`], with a deterministic fallback
//! - `Generator` - writes and fixes single files, one optional search round
//! - `Evaluator` - schema-checked [`Review`] plus Python execution checks

pub mod evaluator;
pub mod generator;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod review;

pub use evaluator::Evaluator;
pub use generator::{GenerationContext, Generator};
pub use plan::{FileRole, FileSpec, Plan, TaskSpec};
pub use planner::Planner;
pub use review::{Review, Severity};

/// Agent ids used for model resolution, metrics and protocol messages
pub const PLANNER_ID: &str = "planner";
pub const CODEGEN_ID: &str = "codegen";
pub const EVALUATOR_ID: &str = "evaluator";

/// Every agent id, in pipeline order
pub const AGENT_IDS: [&str; 3] = [PLANNER_ID, CODEGEN_ID, EVALUATOR_ID];
