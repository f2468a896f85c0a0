//! # Generator Agent
//!
//! Writes one file per call, and rewrites a file from review feedback.
//!
//! The model may call `web_search` once. If it asks for tools again, every
//! open call is answered with a limit notice and the model is told to
//! answer directly, without tools.

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

use super::plan::{FileSpec, Plan};
use super::prompts;
use super::review::Review;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, ToolCall, ToolSpec};
use crate::tools::search::{format_results, WebSearch};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[a-zA-Z]*\n?").unwrap());

/// Phrases that open a chatty preamble rather than code
const PREAMBLE_MARKERS: &[&str] = &[
    "here is",
    "here are",
    "here's",
    "the code",
    "the following",
    "below is",
    "i've generated",
    "i have generated",
    "you can use",
    "this code",
    "code for",
];

const TOOL_LIMIT_NOTICE: &str =
    "Tool call limit reached. Please generate code directly without further tool calls.";
const ANSWER_NOW: &str = "Please generate the complete code file now. Do not call any more tools. Output the code directly.";
const TOOL_UNAVAILABLE: &str = "Tool not available";

/// Everything the generator knows about the surrounding project
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// The user's original request
    pub task_description: String,
    pub plan: Option<Plan>,
    /// Knowledge base digest for this file
    pub knowledge_context: String,
}

impl GenerationContext {
    pub fn new(task_description: impl Into<String>) -> Self {
        Self {
            task_description: task_description.into(),
            ..Self::default()
        }
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_knowledge_context(mut self, context: impl Into<String>) -> Self {
        self.knowledge_context = context.into();
        self
    }
}

pub struct Generator {
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<dyn WebSearch>>,
    search_top_k: usize,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            search: None,
            search_top_k: 3,
        }
    }

    /// Offer the `web_search` tool backed by `search`
    pub fn with_search(mut self, search: Arc<dyn WebSearch>, top_k: usize) -> Self {
        self.search = Some(search);
        self.search_top_k = top_k;
        self
    }

    /// Generate the full content of `spec`
    pub async fn generate(&self, spec: &FileSpec, context: &GenerationContext) -> anyhow::Result<String> {
        tracing::info!("Generating {}", spec.path);
        let messages = vec![
            ChatMessage::system(prompts::CODEGEN),
            ChatMessage::user(generation_request(spec, context)),
        ];
        self.complete(messages)
            .await
            .with_context(|| format!("Failed to generate {}", spec.path))
    }

    /// Rewrite `old_content` to address the review's findings
    pub async fn fix(&self, old_content: &str, review: &Review) -> anyhow::Result<String> {
        let request = format!(
            "Replace the following code:\nIssues to address: {}\nOriginal code: {}\n\n\
If you need to search for bug fixes or best practices, you can use the web_search tool.",
            review.fix_notes(),
            old_content
        );
        let messages = vec![ChatMessage::system(prompts::CODEGEN), ChatMessage::user(request)];
        self.complete(messages).await.context("Failed to generate fix")
    }

    /// Chat with at most one tool round, then force a direct answer
    async fn complete(&self, mut messages: Vec<ChatMessage>) -> anyhow::Result<String> {
        let tools = vec![web_search_tool()];

        let reply = self
            .llm
            .chat(&messages, ChatOptions::default().with_tools(tools.clone()))
            .await?;
        if !reply.has_tool_calls() {
            return Ok(extract_pure_code(&reply.content));
        }

        messages.push(reply.to_message());
        for call in &reply.tool_calls {
            let result = self.run_tool(call).await;
            messages.push(ChatMessage::tool(&call.id, result));
        }

        let reply = self
            .llm
            .chat(&messages, ChatOptions::default().with_tools(tools))
            .await?;
        if !reply.has_tool_calls() {
            return Ok(extract_pure_code(&reply.content));
        }

        tracing::info!("Tool call limit reached, requesting a direct answer");
        messages.push(reply.to_message());
        for call in &reply.tool_calls {
            messages.push(ChatMessage::tool(&call.id, TOOL_LIMIT_NOTICE));
        }
        messages.push(ChatMessage::user(ANSWER_NOW));

        let reply = self.llm.chat(&messages, ChatOptions::default()).await?;
        Ok(extract_pure_code(&reply.content))
    }

    async fn run_tool(&self, call: &ToolCall) -> String {
        let Some(search) = self.search.as_ref().filter(|_| call.function.name == "web_search") else {
            tracing::warn!("Model requested unavailable tool '{}'", call.function.name);
            return TOOL_UNAVAILABLE.to_string();
        };
        let query = call
            .parsed_arguments()
            .ok()
            .and_then(|args| args.get("query").and_then(|q| q.as_str()).map(String::from))
            .unwrap_or_default();
        tracing::info!("Generator searching web for: {}", query);
        format_results(&search.search(&query, self.search_top_k).await)
    }
}

/// The single tool the generator may call
pub fn web_search_tool() -> ToolSpec {
    ToolSpec::function(
        "web_search",
        "Search the web for templates, examples, documentation or bug fixes",
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        }),
    )
}

fn generation_request(spec: &FileSpec, context: &GenerationContext) -> String {
    let mut request = format!(
        "ORIGINAL USER TASK:\n{}\n\nFILE TO GENERATE: {}\nFILE ROLE: {}\nDESCRIPTION: {}\n",
        context.task_description, spec.path, spec.role, spec.description
    );

    let guidelines = prompts::guidelines_for(&spec.path);
    if !guidelines.is_empty() {
        request.push_str("\nGENERATION GUIDELINES:\n");
        request.push_str(guidelines);
        request.push('\n');
    }

    if let Some(plan) = &context.plan {
        let structure: Vec<String> = plan
            .files()
            .map(|f| format!("- {} ({})", f.path, f.role))
            .collect();
        request.push_str("\nPROJECT FILES:\n");
        request.push_str(&structure.join("\n"));
        request.push('\n');
    }

    if !context.knowledge_context.trim().is_empty() {
        request.push_str("\nAVAILABLE CODE CONTEXT:\n");
        request.push_str(&context.knowledge_context);
        request.push('\n');
    }

    request.push_str(
        "\nCRITICAL: Output ONLY the raw file content for the path above.\n\
CRITICAL: Use relative paths that match the project files.\n\
CRITICAL: The file must be complete and functional.",
    );
    request
}

/// Strip fences and a leading chatty preamble, leaving the code untouched
pub fn extract_pure_code(content: &str) -> String {
    let unfenced = CODE_FENCE.replace_all(content, "");
    let lines: Vec<&str> = unfenced.lines().collect();

    let mut start = 0;
    for line in lines.iter().take(5) {
        let lower = line.to_lowercase();
        if PREAMBLE_MARKERS.iter().any(|m| lower.contains(m)) {
            start += 1;
        } else {
            break;
        }
    }

    let code = lines[start..].join("\n").trim().to_string();
    if code.is_empty() {
        unfenced.trim().to_string()
    } else {
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::plan::FileRole;
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::{AssistantReply, Role};
    use crate::tools::search::testing::RecordingSearch;

    fn search_call(id: &str, query: &str) -> ToolCall {
        ToolCall::new(id, "web_search", json!({ "query": query }))
    }

    #[test]
    fn test_all_preamble_answer_loses_its_fences() {
        let raw = "Here is the file:\n```css\n```";
        assert_eq!(extract_pure_code(raw), "Here is the file:");
        assert!(!extract_pure_code(raw).contains("```"));
    }

    #[test]
    fn test_extract_strips_fences_and_preamble() {
        let raw = "Here's the code you requested:\n```python\ndef main():\n    pass\n```";
        assert_eq!(extract_pure_code(raw), "def main():\n    pass");
    }

    #[test]
    fn test_extract_keeps_code_mentioning_markers_later() {
        let raw = "import os\n# here is a comment\nprint(os.name)";
        assert_eq!(extract_pure_code(raw), raw);
    }

    #[test]
    fn test_extract_falls_back_to_raw_content() {
        assert_eq!(extract_pure_code("  Here is the code  "), "Here is the code");
    }

    #[test]
    fn test_request_sections() {
        let spec = FileSpec::new("css/style.css", "Site styles", FileRole::Style);
        let ctx = GenerationContext::new("build a blog")
            .with_knowledge_context("Available functions from other modules:\n- util.slug(text)");
        let request = generation_request(&spec, &ctx);
        assert!(request.starts_with("ORIGINAL USER TASK:\nbuild a blog"));
        assert!(request.contains("FILE ROLE: style"));
        assert!(request.contains(prompts::CSS_GUIDELINES));
        assert!(request.contains("AVAILABLE CODE CONTEXT:\nAvailable functions"));
    }

    #[tokio::test]
    async fn test_single_tool_round() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            AssistantReply::with_tool_calls(vec![search_call("c1", "flask routing")]),
            AssistantReply::text("print('ok')"),
        ]));
        let search = Arc::new(RecordingSearch::default());
        let generator = Generator::new(llm.clone()).with_search(search.clone(), 3);

        let spec = FileSpec::new("app.py", "app", FileRole::EntryPoint);
        let code = generator.generate(&spec, &GenerationContext::new("web api")).await.unwrap();

        assert_eq!(code, "print('ok')");
        assert_eq!(*search.queries.lock().unwrap(), vec!["flask routing"]);
        let calls = llm.calls.lock().unwrap();
        let tool_msg = calls[1].0.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert!(tool_msg.content.contains("CSS Grid guide"));
    }

    #[tokio::test]
    async fn test_second_tool_round_is_refused() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            AssistantReply::with_tool_calls(vec![search_call("c1", "a")]),
            AssistantReply::with_tool_calls(vec![search_call("c2", "b"), search_call("c3", "c")]),
            AssistantReply::text("x = 1"),
        ]));
        let generator = Generator::new(llm.clone());

        let spec = FileSpec::new("x.py", "", FileRole::General);
        let code = generator.generate(&spec, &GenerationContext::default()).await.unwrap();
        assert_eq!(code, "x = 1");

        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        // no search backend: first round answered as unavailable
        assert_eq!(calls[1].0.last().unwrap().content, TOOL_UNAVAILABLE);

        let (final_messages, tool_count) = &calls[2];
        assert_eq!(*tool_count, 0);
        let n = final_messages.len();
        assert_eq!(final_messages[n - 1].content, ANSWER_NOW);
        assert_eq!(final_messages[n - 2].tool_call_id.as_deref(), Some("c3"));
        assert_eq!(final_messages[n - 3].content, TOOL_LIMIT_NOTICE);
    }

    #[tokio::test]
    async fn test_fix_prompt_carries_review_notes() {
        let llm = Arc::new(ScriptedLlm::always("def fixed():\n    return 1"));
        let generator = Generator::new(llm.clone());
        let review = Review::default_for("x", 0.7);

        let fixed = generator.fix("x", &review).await.unwrap();
        assert!(fixed.starts_with("def fixed"));

        let calls = llm.calls.lock().unwrap();
        let prompt = &calls[0].0[1].content;
        assert!(prompt.starts_with("Replace the following code:\nIssues to address: modularity:"));
        assert!(prompt.contains("Original code: x"));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let generator = Generator::new(Arc::new(ScriptedLlm::offline()));
        let spec = FileSpec::new("main.py", "", FileRole::General);
        let err = generator
            .generate(&spec, &GenerationContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("main.py"));
    }
}
