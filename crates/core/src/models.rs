//! # CodeForge Models
//!
//! Centralized LLM configuration types shared by the agents and the
//! orchestrator.
//!
//! Every supported provider speaks the OpenAI chat-completions wire
//! format, so a provider only contributes a base URL and the name of the
//! environment variable holding its key.

use serde::{Deserialize, Serialize};

/// Supported LLM providers
///
/// - DashScope (Qwen) - `DASHSCOPE_API_KEY`
/// - OpenAI (GPT) - `OPENAI_API_KEY`
/// - DeepSeek - `DEEPSEEK_API_KEY`
/// - OpenRouter (Gateway) - `OPENROUTER_API_KEY`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    DashScope,
    #[serde(rename = "openai")]
    OpenAI,
    DeepSeek,
    OpenRouter,
}

impl LlmProvider {
    /// Get all available providers
    pub fn all() -> Vec<LlmProvider> {
        vec![
            LlmProvider::DashScope,
            LlmProvider::OpenAI,
            LlmProvider::DeepSeek,
            LlmProvider::OpenRouter,
        ]
    }

    /// Display name for status output
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::DashScope => "DashScope",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::DeepSeek => "DeepSeek",
            LlmProvider::OpenRouter => "OpenRouter",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::DashScope => "DASHSCOPE_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::DeepSeek => "DEEPSEEK_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    /// OpenAI-compatible endpoint root (without `/chat/completions`)
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::DeepSeek => "https://api.deepseek.com/v1",
            LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Default model for an agent id when nothing is configured
    pub fn default_model(&self, agent_id: &str) -> &'static str {
        match (self, agent_id) {
            (LlmProvider::DashScope, "codegen") => "qwen3-coder-plus",
            (LlmProvider::DashScope, _) => "qwen3-235b-a22b-thinking-2507",
            (LlmProvider::OpenAI, _) => "gpt-4o",
            (LlmProvider::DeepSeek, "codegen") => "deepseek-coder",
            (LlmProvider::DeepSeek, _) => "deepseek-chat",
            (LlmProvider::OpenRouter, _) => "qwen/qwen3-coder",
        }
    }
}

/// Configuration for LLM model selection
///
/// ## Example
/// ```rust,ignore
/// use codeforge_core::models::{LlmProvider, ModelConfig};
///
/// let config = ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o")
///     .with_api_key("sk-...");
/// let client = config.create_client()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// LLM provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "qwen3-coder-plus", "gpt-4o")
    pub model: String,
    /// Optional base URL override
    pub base_url: Option<String>,
    /// Explicit API key; falls back to the provider's env var
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::DashScope,
            model: "qwen3-coder-plus".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

impl ModelConfig {
    /// Create a new model config with the default provider (DashScope)
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            api_key: None,
        }
    }

    /// Set base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set an explicit API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Endpoint root actually used for requests
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the API key: explicit value first, then the provider env var
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(self.provider.api_key_env())
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }

    /// Create an HTTP client for this configuration
    pub fn create_client(&self) -> Result<crate::llm::HttpLlmClient, crate::llm::LlmError> {
        crate::llm::HttpLlmClient::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.provider, LlmProvider::DashScope);
        assert!(config.model.contains("qwen"));
    }

    #[test]
    fn test_provider_display_names() {
        assert_eq!(LlmProvider::DashScope.display_name(), "DashScope");
        assert_eq!(LlmProvider::OpenAI.display_name(), "OpenAI");
        assert_eq!(LlmProvider::all().len(), 4);
    }

    #[test]
    fn test_default_models_per_agent() {
        assert_eq!(
            LlmProvider::DashScope.default_model("codegen"),
            "qwen3-coder-plus"
        );
        assert_eq!(
            LlmProvider::DashScope.default_model("planner"),
            "qwen3-235b-a22b-thinking-2507"
        );
    }

    #[test]
    fn test_effective_base_url_trims_slash() {
        let config = ModelConfig::new("m").with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.effective_base_url(), "http://localhost:8080/v1");
        let config = ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o");
        assert_eq!(config.effective_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let config = ModelConfig::new("m").with_api_key("explicit");
        assert_eq!(config.resolve_api_key().as_deref(), Some("explicit"));
    }

    #[test]
    fn test_model_config_serialization_skips_key() {
        let config =
            ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o").with_api_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("openai"));
        assert!(json.contains("gpt-4o"));
        assert!(!json.contains("secret"));
    }
}
