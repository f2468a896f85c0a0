//! # Planner Agent
//!
//! Turns the user's request into a [`Plan`]. Planning never fails: an
//! unreachable model or an unparseable answer falls back to a
//! deterministic default plan so the pipeline always has work to do.
//!
//! ## Flow
//!
//! 1. Optional web search, using a model-extracted query
//! 2. Ask the model for a JSON plan
//! 3. Parse: whole answer, then a fenced ```json block, then the first
//!    balanced `{...}` region
//! 4. Fill missing fields, or fall back to [`default_plan`]

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use super::plan::{FileRole, FileSpec, Plan, TaskSpec};
use super::prompts;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::tools::search::{format_results, truncate_query, WebSearch};

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json\s*([\s\S]*?)```").unwrap());

const MAX_QUERY_CHARS: usize = 400;

/// Substrings that mark a request as a web project
const WEB_INDICATORS: &[&str] = &[
    "webpage",
    "website",
    "html",
    "css",
    "javascript",
    "frontend",
    "web app",
    "navigation",
    "responsive",
];

/// Labels models like to prefix their query with
const QUERY_LABELS: &[&str] = &["Essential search keywords:", "Search keywords:", "Keywords:"];

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<dyn WebSearch>>,
    search_top_k: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            search: None,
            search_top_k: 3,
        }
    }

    /// Enable the pre-planning web search
    pub fn with_search(mut self, search: Arc<dyn WebSearch>, top_k: usize) -> Self {
        self.search = Some(search);
        self.search_top_k = top_k;
        self
    }

    #[tracing::instrument(skip(self, task), fields(task_preview = %task.chars().take(50).collect::<String>()))]
    pub async fn plan(&self, task: &str) -> Plan {
        let mut request = task.to_string();

        if let Some(search) = &self.search {
            let query = self.extract_search_query(task).await;
            tracing::info!("Searching web for: {}", query);
            let results = search.search(&query, self.search_top_k).await;
            if results.is_empty() {
                tracing::info!("No search results, planning without search context");
            } else {
                tracing::info!("Found {} search results", results.len());
                request.push_str("\n\nSearchContext:\n");
                request.push_str(&format_results(&results));
            }
        }

        let messages = vec![
            ChatMessage::system(prompts::PLANNER),
            ChatMessage::user(planning_request(&request)),
        ];
        match self.llm.chat(&messages, ChatOptions::default()).await {
            Ok(reply) => match parse_plan(&reply.content) {
                Some(plan) => plan,
                None => {
                    tracing::warn!("Planner answer was not a usable plan, using default plan");
                    default_plan(task)
                }
            },
            Err(e) => {
                tracing::warn!("Planner LLM call failed: {}, using default plan", e);
                default_plan(task)
            }
        }
    }

    /// Model-condensed search query, bounded to the provider limit
    async fn extract_search_query(&self, task: &str) -> String {
        let fallback = || truncate_chars(task.trim(), MAX_QUERY_CHARS);

        let mut messages = vec![
            ChatMessage::system(prompts::KEYWORD_EXTRACTOR),
            ChatMessage::user(format!("Task: {}", task)),
        ];
        let reply = match self.llm.chat(&messages, ChatOptions::default()).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Keyword extraction failed: {}, using task text", e);
                return fallback();
            }
        };

        let mut query = clean_query(&reply.content);
        if query.chars().count() > MAX_QUERY_CHARS {
            tracing::info!(
                "Search query too long ({} chars), asking for a shorter one",
                query.chars().count()
            );
            messages.push(reply.to_message());
            messages.push(ChatMessage::user(format!(
                "That query is too long. Reply with only the most essential search terms, under {} characters.\nTask: {}",
                MAX_QUERY_CHARS, task
            )));
            query = match self.llm.chat(&messages, ChatOptions::default()).await {
                Ok(retry) => clean_query(&retry.content),
                Err(e) => {
                    tracing::warn!("Shorter keyword extraction failed: {}", e);
                    query
                }
            };
            query = truncate_query(&query);
        }

        if query.is_empty() {
            fallback()
        } else {
            query
        }
    }
}

fn planning_request(request: &str) -> String {
    format!(
        "Generate a project plan for this task:\n\n{}\n\n\
Break it into logical tasks with specific files. Include file types that fit the task:\n\
- Web projects: HTML, CSS, JavaScript and JSON files\n\
- Python projects: scripts and modules\n\
- Data projects: data files and processing scripts\n\n\
Use exact paths like \"data/items.json\", \"js/main.js\", \"css/style.css\", \"main.py\", \"utils/helpers.py\".\n\n\
The plan must match this JSON schema:\n{}\n\n\
Return ONLY the JSON plan.",
        request,
        plan_schema()
    )
}

fn plan_schema() -> String {
    serde_json::to_string_pretty(&schemars::schema_for!(Plan)).unwrap_or_default()
}

fn clean_query(raw: &str) -> String {
    let mut query = raw.trim().to_string();
    for label in QUERY_LABELS {
        query = query.replace(label, "");
    }
    query.trim().trim_matches('"').trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a model answer into a plan; `None` when nothing usable is found
pub fn parse_plan(content: &str) -> Option<Plan> {
    let candidates = [
        Some(content.trim().to_string()),
        JSON_FENCE
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        first_balanced_object(content).map(String::from),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| plan_from_json(&candidate))
}

fn plan_from_json(candidate: &str) -> Option<Plan> {
    let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
    if !value.is_object() {
        return None;
    }
    let plan: Plan = serde_json::from_value(value).ok()?;
    let plan = plan.normalize();
    (plan.file_count() > 0).then_some(plan)
}

/// First `{...}` region with balanced braces, ignoring braces in strings
fn first_balanced_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// Fallback
// ============================================================================

/// Deterministic plan chosen by sniffing the request text
///
/// Web requests get a list page, a detail page and a data file; anything
/// else gets a single Python entry point.
pub fn default_plan(task: &str) -> Plan {
    let lower = task.to_lowercase();
    if WEB_INDICATORS.iter().any(|w| lower.contains(w)) {
        web_default_plan()
    } else {
        Plan {
            task_list: vec![TaskSpec {
                task: task.to_string(),
                files: vec![FileSpec::new("main.py", "Main application file", FileRole::General)],
            }],
            estimated_time: "Unknown".into(),
            priority: "medium".into(),
            dependencies: Vec::new(),
        }
    }
}

fn web_default_plan() -> Plan {
    Plan {
        task_list: vec![
            TaskSpec {
                task: "Create main HTML page with navigation and content display".into(),
                files: vec![
                    FileSpec::new(
                        "index.html",
                        "Main page with header navigation, a hero section and a dynamic content container. Proper HTML5 structure with semantic tags. References css/style.css and js/main.js.",
                        FileRole::EntryPoint,
                    ),
                    FileSpec::new(
                        "css/style.css",
                        "Main stylesheet with reset, header and navigation styles, a grid layout and responsive rules. Modern CSS with flexbox or grid.",
                        FileRole::Style,
                    ),
                    FileSpec::new(
                        "js/main.js",
                        "Loads items from data/items.json, renders them into the content container and links each one to detail.html?id=<id>. Modern ES6+ syntax.",
                        FileRole::Logic,
                    ),
                ],
            },
            TaskSpec {
                task: "Create detail page for individual items".into(),
                files: vec![
                    FileSpec::new(
                        "detail.html",
                        "Detail page with back navigation, a title area and a content section. Reads the item id from the URL. References css/style.css and js/detail-page.js.",
                        FileRole::View,
                    ),
                    FileSpec::new(
                        "js/detail-page.js",
                        "Loads the item whose id matches the 'id' URL parameter from data/items.json and renders it, handling missing items gracefully. Accepts either a bare array or an object wrapping the array.",
                        FileRole::Logic,
                    ),
                ],
            },
            TaskSpec {
                task: "Create sample data files".into(),
                files: vec![FileSpec::new(
                    "data/items.json",
                    "Sample data as a top-level array of items. Each item has 'id', 'title', 'description' and optional 'category', 'authors', 'time', 'link'.",
                    FileRole::Data,
                )],
            },
        ],
        estimated_time: "2-3 hours".into(),
        priority: "high".into(),
        dependencies: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::AssistantReply;
    use crate::tools::search::testing::RecordingSearch;

    const PLAN_JSON: &str = r#"{"task_list": [{"task": "Build CLI", "files": [{"path": "cli.py", "description": "entry", "role": "entry_point"}]}], "estimated_time": "1 hour", "priority": "low"}"#;

    #[test]
    fn test_parse_direct_json() {
        let plan = parse_plan(PLAN_JSON).unwrap();
        assert_eq!(plan.task_list[0].files[0].role, FileRole::EntryPoint);
        assert_eq!(plan.priority, "low");
    }

    #[test]
    fn test_parse_fenced_and_embedded_json() {
        let fenced = format!("Here is the plan:\n```json\n{}\n```\nGood luck!", PLAN_JSON);
        assert!(parse_plan(&fenced).is_some());

        let embedded = format!("Sure. {} Let me know {{if}} you need more.", PLAN_JSON);
        assert_eq!(parse_plan(&embedded).unwrap().task_list[0].task, "Build CLI");
    }

    #[test]
    fn test_loosely_typed_plan_is_kept() {
        let loose = r#"{"task_list": [{"task": "Build CLI", "files": [
            {"path": "cli.py", "description": null, "role": "entry_point"}
        ]}], "estimated_time": 2, "dependencies": null}"#;
        let plan = parse_plan(loose).unwrap();
        assert_eq!(plan.task_list[0].files[0].path, "cli.py");
        assert_eq!(plan.estimated_time, "2");
        assert!(plan.dependencies.is_empty());
    }

    #[test]
    fn test_balanced_scan_ignores_braces_in_strings() {
        let text = r#"prefix {"a": "}{", "b": {"c": 1}} suffix }"#;
        assert_eq!(first_balanced_object(text), Some(r#"{"a": "}{", "b": {"c": 1}}"#));
    }

    #[test]
    fn test_unusable_answers_rejected() {
        assert!(parse_plan("no plan here").is_none());
        assert!(parse_plan(r#"{"task_list": []}"#).is_none());
        assert!(parse_plan("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_default_plan_sniffs_web_requests() {
        let web = default_plan("Build a responsive website listing books");
        assert_eq!(web.file_count(), 6);
        assert_eq!(web.priority, "high");
        assert!(web.files().any(|f| f.path == "data/items.json" && f.role == FileRole::Data));

        let cli = default_plan("create a todo app");
        assert_eq!(cli.file_count(), 1);
        assert_eq!(cli.task_list[0].files[0].path, "main.py");
        assert_eq!(cli.task_list[0].task, "create a todo app");
    }

    #[tokio::test]
    async fn test_offline_planner_falls_back() {
        let planner = Planner::new(Arc::new(ScriptedLlm::offline()));
        let plan = planner.plan("create a todo app").await;
        assert_eq!(plan, default_plan("create a todo app"));
    }

    #[tokio::test]
    async fn test_search_context_reaches_planning_prompt() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            AssistantReply::text("Keywords: todo app python"),
            AssistantReply::text(PLAN_JSON),
        ]));
        let search = Arc::new(RecordingSearch::default());
        let planner = Planner::new(llm.clone()).with_search(search.clone(), 3);

        let plan = planner.plan("create a todo app").await;
        assert_eq!(plan.task_list[0].task, "Build CLI");
        assert_eq!(*search.queries.lock().unwrap(), vec!["todo app python"]);

        let calls = llm.calls.lock().unwrap();
        let planning_prompt = &calls[1].0[1].content;
        assert!(planning_prompt.contains("SearchContext:"));
        assert!(planning_prompt.contains("CSS Grid guide"));
        assert!(planning_prompt.contains("\"task_list\""));
    }

    #[tokio::test]
    async fn test_overlong_query_is_bounded() {
        let long = "word ".repeat(200);
        let llm = Arc::new(ScriptedLlm::new(vec![
            AssistantReply::text(long.clone()),
            AssistantReply::text(long),
        ]));
        let planner = Planner::new(llm.clone());
        let query = planner.extract_search_query("anything").await;
        assert_eq!(query.chars().count(), MAX_QUERY_CHARS);
        assert!(query.ends_with("..."));
        assert_eq!(llm.call_count(), 2);
    }
}
