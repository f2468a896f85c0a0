//! OpenAI-compatible chat-completions client with bounded linear-backoff retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{AssistantReply, ChatMessage, ChatOptions, LlmClient, LlmError, Role, ToolCall, ToolSpec};
use crate::models::ModelConfig;

const DEFAULT_MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "<[ToolSpec]>::is_empty")]
    tools: &'a [ToolSpec],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl From<ResponseMessage> for AssistantReply {
    fn from(message: ResponseMessage) -> Self {
        AssistantReply {
            role: Role::Assistant,
            content: message.content.unwrap_or_default(),
            reasoning_content: message.reasoning_content.filter(|r| !r.is_empty()),
            tool_calls: message.tool_calls.unwrap_or_default(),
        }
    }
}

/// HTTP client for any provider in [`crate::models::LlmProvider`]
#[derive(Debug, Clone)]
pub struct HttpLlmClient {
    config: ModelConfig,
    api_key: String,
    http: reqwest::Client,
    max_retries: u32,
    backoff_unit: Duration,
}

impl HttpLlmClient {
    /// Build a client; fails immediately when no API key can be found.
    pub fn new(config: ModelConfig) -> Result<Self, LlmError> {
        let api_key = config
            .resolve_api_key()
            .ok_or(LlmError::MissingApiKey {
                provider: config.provider.display_name(),
                env_var: config.provider.api_key_env(),
            })?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            config,
            api_key,
            http,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_secs(1),
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.effective_base_url())
    }

    async fn send_once(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<AssistantReply, LlmError> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: options.temperature,
            tools: &options.tools,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parse_first_choice(parsed)
    }
}

fn parse_first_choice(response: CompletionResponse) -> Result<AssistantReply, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.into())
        .ok_or(LlmError::EmptyResponse)
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<AssistantReply, LlmError> {
        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            match self.send_once(messages, &options).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    tracing::warn!(
                        model = %self.config.model,
                        "LLM retry {}/{} due to error: {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    last_error = e.to_string();
                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(self.backoff_unit * (attempt + 1)).await;
                    }
                }
            }
        }
        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries,
            last_error,
        })
    }
}
