//! JavaScript syntax (via `node --check`) and DOM id usage.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use super::{read_source, ValidationReport};
use crate::tools::executor::{check_js_syntax, SyntaxCheck};

static ID_LOOKUPS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r#"getElementById\(["']([^"']+)["']\)"#).unwrap(),
        Regex::new(r#"querySelector\(["']#([^"']+)["']\)"#).unwrap(),
        Regex::new(r#"querySelectorAll\(["']#([^"']+)["']?\)"#).unwrap(),
    ]
});
static FETCH_OR_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:fetch|import)\(["']([^"']+)["']"#).unwrap());

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsReport {
    #[serde(flatten)]
    pub report: ValidationReport,
    pub used_ids: BTreeSet<String>,
    pub missing_ids: BTreeSet<String>,
    pub external_refs: Vec<String>,
}

/// Validate source; `html_ids` enables the missing-id check
pub fn validate(content: &str, html_ids: Option<&BTreeSet<String>>, syntax_check: bool) -> JsReport {
    let mut report = ValidationReport::new();

    if syntax_check {
        match check_js_syntax(content) {
            SyntaxCheck::Passed => {}
            SyntaxCheck::Failed(message) => report.error(format!("Syntax error: {}", message)),
            SyntaxCheck::Unavailable => report.warn("Node.js not available, skipping syntax check"),
        }
    }

    let used_ids: BTreeSet<String> = ID_LOOKUPS
        .iter()
        .flat_map(|re| re.captures_iter(content))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    let external_refs = FETCH_OR_IMPORT
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    let missing_ids: BTreeSet<String> = match html_ids {
        Some(ids) => used_ids.difference(ids).cloned().collect(),
        None => BTreeSet::new(),
    };
    if !missing_ids.is_empty() {
        report.warn(format!(
            "IDs used in JS but not found in HTML: {}",
            missing_ids.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    JsReport {
        report,
        used_ids,
        missing_ids,
        external_refs,
    }
}

pub fn validate_file(path: &Path, html_ids: Option<&BTreeSet<String>>, syntax_check: bool) -> JsReport {
    match read_source(path) {
        Ok(content) => validate(&content, html_ids, syntax_check),
        Err(report) => JsReport {
            report,
            ..JsReport::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
async function load() {
  const res = await fetch('data/items.json');
  const list = document.getElementById("item-list");
  const form = document.querySelector('#search-form');
  document.querySelectorAll('#filters');
  return res.json();
}
"#;

    #[test]
    fn test_used_ids_and_refs() {
        let result = validate(SCRIPT, None, false);
        assert!(result.report.valid);
        let ids: Vec<_> = result.used_ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["filters", "item-list", "search-form"]);
        assert_eq!(result.external_refs, vec!["data/items.json"]);
        assert!(result.missing_ids.is_empty());
    }

    #[test]
    fn test_missing_ids_are_warnings() {
        let html_ids: BTreeSet<String> = ["item-list".to_string()].into_iter().collect();
        let result = validate(SCRIPT, Some(&html_ids), false);
        assert!(result.report.valid);
        assert_eq!(result.missing_ids.len(), 2);
        assert!(result.report.warnings[0].contains("filters, search-form"));
    }

    #[test]
    fn test_syntax_check_never_hard_fails_without_node() {
        let result = validate("function ok() { return 1; }", None, true);
        // Either node validated it or it was skipped with a warning
        assert!(result.report.valid);
    }
}
