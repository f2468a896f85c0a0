//! # Agent Protocol
//!
//! Typed messages exchanged between the agents. The orchestrator builds
//! one per hand-off and keeps them in the run memory.
//!
//! | Message | From | To |
//! |---|---|---|
//! | `task_assignment` | planner | codegen |
//! | `code_submission` | codegen | evaluator |
//! | `review_feedback` | evaluator | codegen |

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::agents::{FileSpec, Plan, Review, CODEGEN_ID, EVALUATOR_ID, PLANNER_ID};

pub const PROTOCOL_VERSION: &str = "1.0";

const PREVIEW_CHARS: usize = 200;

static BRANCH_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(if|for|while|def|class)\b").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    pub source_agent: String,
    pub target_agent: String,
    pub communication_id: String,
}

/// One hand-off between two agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub protocol_version: String,
    #[serde(flatten)]
    pub payload: Payload,
    pub metadata: MessageMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Payload {
    TaskAssignment(TaskAssignment),
    CodeSubmission(CodeSubmission),
    ReviewFeedback(ReviewFeedback),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub plan_context: Plan,
    pub file_spec: FileSpec,
    pub code_knowledge_context: String,
    pub priority: String,
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSubmission {
    pub file_path: String,
    pub content_preview: String,
    pub content_length: usize,
    pub language: String,
    pub quality_metrics: CodeMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFeedback {
    pub review_result: Review,
    pub original_content_preview: String,
    pub fix_required: bool,
    pub suggested_changes: Option<String>,
    pub severity_level: FeedbackLevel,
}

/// Urgency of review feedback, read from the notes wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    Critical,
    Warning,
    Suggestion,
    Info,
}

impl FeedbackLevel {
    const TABLE: [(FeedbackLevel, &'static [&'static str]); 3] = [
        (FeedbackLevel::Critical, &["critical", "error", "fatal", "broken"]),
        (FeedbackLevel::Warning, &["warning", "issue", "problem"]),
        (FeedbackLevel::Suggestion, &["suggestion", "improvement", "enhancement"]),
    ];

    /// First level in the table whose keywords appear in `notes`
    pub fn from_notes(notes: &str) -> Self {
        let lower = notes.to_lowercase();
        Self::TABLE
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(level, _)| *level)
            .unwrap_or(FeedbackLevel::Info)
    }
}

/// Cheap size and shape metrics of a source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMetrics {
    pub line_count: usize,
    pub non_empty_lines: usize,
    pub avg_line_length: f64,
    /// Lines containing a branch, loop or definition keyword
    pub complexity_estimate: usize,
}

impl CodeMetrics {
    pub fn of(content: &str) -> Self {
        let lines: Vec<&str> = content.split('\n').collect();
        let total_len: usize = lines.iter().map(|l| l.chars().count()).sum();
        Self {
            line_count: lines.len(),
            non_empty_lines: lines.iter().filter(|l| !l.trim().is_empty()).count(),
            avg_line_length: total_len as f64 / lines.len().max(1) as f64,
            complexity_estimate: lines.iter().filter(|l| BRANCH_KEYWORD.is_match(l)).count(),
        }
    }
}

/// Language name from the file extension
pub fn detect_language(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("py") => "python",
        Some("js") => "javascript",
        Some("ts") => "typescript",
        Some("java") => "java",
        Some("cpp") => "cpp",
        Some("c") => "c",
        Some("go") => "go",
        Some("rs") => "rust",
        Some("html") => "html",
        Some("css") => "css",
        Some("json") => "json",
        _ => "unknown",
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

impl ProtocolMessage {
    fn new(from: &str, to: &str, payload: Payload) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            timestamp: Utc::now(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            payload,
            metadata: MessageMetadata {
                source_agent: from.to_string(),
                target_agent: to.to_string(),
                communication_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }

    pub fn planner_to_codegen(plan: &Plan, spec: &FileSpec, knowledge_context: &str) -> Self {
        Self::new(
            PLANNER_ID,
            CODEGEN_ID,
            Payload::TaskAssignment(TaskAssignment {
                plan_context: plan.clone(),
                file_spec: spec.clone(),
                code_knowledge_context: knowledge_context.to_string(),
                priority: "high".to_string(),
                deadline: None,
            }),
        )
    }

    pub fn codegen_to_evaluator(file_path: &str, content: &str) -> Self {
        Self::new(
            CODEGEN_ID,
            EVALUATOR_ID,
            Payload::CodeSubmission(CodeSubmission {
                file_path: file_path.to_string(),
                content_preview: preview(content),
                content_length: content.chars().count(),
                language: detect_language(file_path).to_string(),
                quality_metrics: CodeMetrics::of(content),
            }),
        )
    }

    pub fn evaluator_to_codegen(review: &Review, original_content: &str) -> Self {
        let notes = review.notes.clone().unwrap_or_default();
        Self::new(
            EVALUATOR_ID,
            CODEGEN_ID,
            Payload::ReviewFeedback(ReviewFeedback {
                review_result: review.clone(),
                original_content_preview: preview(original_content),
                fix_required: !review.ok,
                severity_level: FeedbackLevel::from_notes(&notes),
                suggested_changes: review.notes.clone(),
            }),
        )
    }

    /// Wire name of the message type
    pub fn message_type(&self) -> &'static str {
        match self.payload {
            Payload::TaskAssignment(_) => "task_assignment",
            Payload::CodeSubmission(_) => "code_submission",
            Payload::ReviewFeedback(_) => "review_feedback",
        }
    }
}
