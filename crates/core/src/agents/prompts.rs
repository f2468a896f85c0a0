//! Default prompt templates bundled at compile time.

use std::path::Path;

/// Planner - turns a request into tasks and files
pub const PLANNER: &str = include_str!("defaults/planner.md");

/// Keyword extractor - condenses a task into a search query
pub const KEYWORD_EXTRACTOR: &str = include_str!("defaults/keyword_extractor.md");

/// Code generator - writes and fixes single files
pub const CODEGEN: &str = include_str!("defaults/codegen.md");

/// Evaluator - scores one file against the review schema
pub const EVALUATOR: &str = include_str!("defaults/evaluator.md");

pub const HTML_GUIDELINES: &str = include_str!("defaults/html_guidelines.md");
pub const JS_GUIDELINES: &str = include_str!("defaults/js_guidelines.md");
pub const CSS_GUIDELINES: &str = include_str!("defaults/css_guidelines.md");
pub const JSON_GUIDELINES: &str = include_str!("defaults/json_guidelines.md");

/// Type-specific generation guidelines; empty for other file types
pub fn guidelines_for(path: &str) -> &'static str {
    match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => HTML_GUIDELINES,
        Some("js") => JS_GUIDELINES,
        Some("css") => CSS_GUIDELINES,
        Some("json") => JSON_GUIDELINES,
        _ => "",
    }
}

/// All bundled prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("planner", PLANNER),
        ("keyword_extractor", KEYWORD_EXTRACTOR),
        ("codegen", CODEGEN),
        ("evaluator", EVALUATOR),
        ("html_guidelines", HTML_GUIDELINES),
        ("js_guidelines", JS_GUIDELINES),
        ("css_guidelines", CSS_GUIDELINES),
        ("json_guidelines", JSON_GUIDELINES),
    ]
}
