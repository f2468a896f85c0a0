//! Orchestrator configuration and per-agent model resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{LlmProvider, ModelConfig};

/// Score at which a file is accepted
pub const TARGET_QUALITY_SCORE: f64 = 0.7;

/// Fix attempts per file before the best version is kept
pub const MAX_FIX_ATTEMPTS: u32 = 5;

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Root of the generated project
    pub output_dir: PathBuf,
    pub target_quality_score: f64,
    pub max_fix_attempts: u32,
    /// Global LLM provider (default: DashScope)
    pub global_provider: LlmProvider,
    /// Global model to use for all agents
    pub global_model: Option<String>,
    /// Base URL override for the provider endpoint
    pub base_url: Option<String>,
    /// Per-agent model overrides (agent_id -> model name)
    pub per_agent_models: HashMap<String, String>,
    /// Explicit API key; the provider env var is used otherwise
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Offer web search to the planner and generator
    pub enable_web_search: bool,
    /// Run generated Python files during evaluation
    pub enable_execution: bool,
    pub execution_timeout_secs: u64,
    pub search_top_k: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            target_quality_score: TARGET_QUALITY_SCORE,
            max_fix_attempts: MAX_FIX_ATTEMPTS,
            global_provider: LlmProvider::DashScope,
            global_model: None,
            base_url: None,
            per_agent_models: HashMap::new(),
            api_key: None,
            enable_web_search: true,
            enable_execution: true,
            execution_timeout_secs: 10,
            search_top_k: 3,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.global_model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_provider(mut self, provider: LlmProvider) -> Self {
        self.global_provider = provider;
        self
    }

    /// Model config for an agent: per-agent override, then global, then
    /// the provider's default for that agent
    pub fn model_config(&self, agent_id: &str) -> ModelConfig {
        let provider = self.global_provider.clone();
        let model = self
            .per_agent_models
            .get(agent_id)
            .or(self.global_model.as_ref())
            .cloned()
            .unwrap_or_else(|| provider.default_model(agent_id).to_string());

        let mut config = ModelConfig::with_provider(provider, model);
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url);
        }
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key);
        }
        config
    }
}
