//! CSS brace balance and selector extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{read_source, ValidationReport};

static SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^{}]+)\s*\{").unwrap());
static BRACE_FOLLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\}\s*[^}{\s]").unwrap());

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CssReport {
    #[serde(flatten)]
    pub report: ValidationReport,
    pub selectors: Vec<String>,
}

pub fn validate(content: &str) -> CssReport {
    let mut report = ValidationReport::new();

    let open = content.matches('{').count();
    let close = content.matches('}').count();
    if open != close {
        report.error(format!(
            "Brace mismatch: {} opening, {} closing",
            open, close
        ));
    }

    let selectors = SELECTOR
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    // Heuristic: a rule body closing straight into another token
    if BRACE_FOLLOWED.is_match(content) {
        report.warn("Possible missing semicolon or brace");
    }

    CssReport { report, selectors }
}

pub fn validate_file(path: &Path) -> CssReport {
    match read_source(path) {
        Ok(content) => validate(&content),
        Err(report) => CssReport {
            report,
            selectors: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbalanced_braces_fail() {
        let result = validate("body{color:red");
        assert!(!result.report.valid);
        assert_eq!(
            result.report.errors,
            vec!["Brace mismatch: 1 opening, 0 closing"]
        );
    }

    #[test]
    fn test_balanced_css_passes() {
        let result = validate("body{color:red}");
        assert!(result.report.valid);
        assert_eq!(result.selectors, vec!["body"]);
    }

    #[test]
    fn test_selectors_and_heuristic_warning() {
        let css = ".card { padding: 4px; }\n.card h2 { margin: 0; }\n";
        let result = validate(css);
        assert!(result.report.valid);
        assert_eq!(result.selectors, vec![".card", ".card h2"]);
        // Every rule after the first follows a closing brace
        assert_eq!(
            result.report.warnings,
            vec!["Possible missing semicolon or brace"]
        );
    }
}
