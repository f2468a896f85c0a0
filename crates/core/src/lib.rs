//! # CodeForge Core
//!
//! Turns a natural-language request into a small generated project with a
//! planner, a generator and an evaluator agent, gated by structural
//! validation and a bounded fix loop.
//!
//! ## Architecture
//!
//! - `models/` - LLM provider and per-agent model configuration
//! - `llm/` - chat client trait and the OpenAI-compatible HTTP client
//! - `tools/` - filesystem, code execution and web search collaborators
//! - `validation/` - HTML, CSS, JS, JSON and Python checks plus cross-file sweeps
//! - `knowledge/` - symbol and web-file index used to build generation context
//! - `agents/` - planner, generator and evaluator
//! - `orchestrator/` - scheduling, fix loop, run memory and events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use codeforge_core::orchestrator::{Orchestrator, OrchestratorConfig};
//!
//! let config = OrchestratorConfig::default().with_output_dir("output");
//! let mut orchestrator = Orchestrator::new(config)?;
//! let summary = orchestrator.run("Build a todo list web app").await?;
//! ```

pub mod agents;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod validation;
