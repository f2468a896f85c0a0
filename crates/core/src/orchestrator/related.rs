//! # Related Files and Link Check
//!
//! Finds which other planned web files belong with the file being
//! generated, and checks the links a finished HTML or JS file makes
//! against them. Link problems are logged, never used to reject a file.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::agents::{FileRole, Plan};
use crate::knowledge::KnowledgeBase;
use crate::validation::html::is_external;
use crate::validation::references::{HTML_CSS, HTML_JS, JS_DATA};
use crate::validation::FileKind;

static NAV_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r#"href=["']([^"']+\.[^"']+)["']"#).unwrap());
static JS_NAVIGATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)window\.location\.href\s*=\s*["']([^"']+)["']"#).unwrap());

// ============================================================================
// Related files
// ============================================================================

/// At most one related file per web type, plan-relative
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedFiles {
    pub html: Option<String>,
    pub css: Option<String>,
    pub js: Option<String>,
    pub json: Option<String>,
}

impl RelatedFiles {
    pub fn get(&self, kind: FileKind) -> Option<&str> {
        match kind {
            FileKind::Html => self.html.as_deref(),
            FileKind::Css => self.css.as_deref(),
            FileKind::Js => self.js.as_deref(),
            FileKind::Json => self.json.as_deref(),
            _ => None,
        }
    }

    fn set(&mut self, kind: FileKind, path: &str) {
        let slot = match kind {
            FileKind::Html => &mut self.html,
            FileKind::Css => &mut self.css,
            FileKind::Js => &mut self.js,
            FileKind::Json => &mut self.json,
            _ => return,
        };
        *slot = Some(path.to_string());
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        [&self.html, &self.css, &self.js, &self.json]
            .into_iter()
            .filter_map(|p| p.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.paths().next().is_none()
    }
}

/// Naming-convention rule between two web file types
struct LogicalRule {
    from: FileKind,
    to: FileKind,
    holds: fn(current_base: &str, other_base: &str, other_role: FileRole) -> bool,
}

/// Checked in order; the first rule matching the type pair decides
const LOGICAL_RULES: &[LogicalRule] = &[
    LogicalRule {
        from: FileKind::Js,
        to: FileKind::Html,
        holds: |_, other, role| role == FileRole::EntryPoint && matches!(other, "index" | "main" | "app"),
    },
    LogicalRule {
        from: FileKind::Html,
        to: FileKind::Js,
        holds: |current, other, _| current == other,
    },
    LogicalRule {
        from: FileKind::Html,
        to: FileKind::Css,
        holds: |current, other, _| matches!(other, "style" | "styles" | "main") || current == other,
    },
    LogicalRule {
        from: FileKind::Js,
        to: FileKind::Json,
        holds: |_, other, role| matches!(other, "data" | "config" | "settings") || role == FileRole::Data,
    },
];

fn logically_related(current: &Path, other: &Path, other_role: FileRole) -> bool {
    let (from, to) = (FileKind::from_path(current), FileKind::from_path(other));
    LOGICAL_RULES
        .iter()
        .find(|r| r.from == from && r.to == to)
        .is_some_and(|r| (r.holds)(&stem(current), &stem(other), other_role))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn parent(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

/// Other planned web files related to `current`
///
/// Related means same directory, one directory containing the other, the
/// same base name, or a naming-convention rule. Later matches of the same
/// type win.
pub fn find_related_web_files(current: &str, plan: &Plan) -> RelatedFiles {
    let current_path = Path::new(current);
    let current_dir = parent(current_path);
    let mut related = RelatedFiles::default();

    for spec in plan.files() {
        if spec.path.is_empty() || spec.path == current {
            continue;
        }
        let other = Path::new(&spec.path);
        let kind = FileKind::from_path(other);
        if !kind.is_web() {
            continue;
        }
        let other_dir = parent(other);
        let is_related = other_dir == current_dir
            || other_dir.starts_with(current_dir)
            || current_dir.starts_with(other_dir)
            || stem(other) == stem(current_path)
            || logically_related(current_path, other, spec.role);
        if is_related {
            related.set(kind, &spec.path);
        }
    }
    related
}

// ============================================================================
// Link check
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Lexically resolve `reference` against `dir`
fn normalize(dir: &Path, reference: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in dir.join(reference).components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Suggested relative path for a fix, from the knowledge base
pub fn suggested_path(current: &str, file_type: &str, knowledge: &KnowledgeBase) -> String {
    let suggestions = knowledge.suggest_web_file_paths(Path::new(current), file_type);
    if let Some(path) = suggestions
        .iter()
        .find(|p| !p.starts_with("../"))
        .or_else(|| suggestions.first())
    {
        return path.clone();
    }
    match file_type {
        "css" => "./styles.css".to_string(),
        "js" => "./script.js".to_string(),
        "html" => "./index.html".to_string(),
        _ => "./data.json".to_string(),
    }
}

struct LinkChecker<'a> {
    current: &'a str,
    related: &'a RelatedFiles,
    knowledge: &'a KnowledgeBase,
    report: LinkReport,
}

impl LinkChecker<'_> {
    fn suggest(&mut self, prefix: &str, file_type: &str) {
        let path = suggested_path(self.current, file_type, self.knowledge);
        self.report.suggestions.push(format!("{}: {}", prefix, path));
    }

    /// Shared handling of css, js and data references
    fn asset(&mut self, label: &str, reference: &str, kind: FileKind, file_type: &str) {
        if is_external(reference) {
            self.report
                .warnings
                .push(format!("{} reference uses an external URL: {}", label, reference));
            return;
        }
        if reference.starts_with('/') {
            self.report.errors.push(format!(
                "{} reference uses an absolute path: {} (use a relative path)",
                label, reference
            ));
            self.suggest(&format!("Change the {} reference to", label), file_type);
            return;
        }
        let Some(expected) = self.related.get(kind) else {
            return;
        };
        if !file_name(expected).contains(file_name(reference)) {
            self.report.warnings.push(format!(
                "{} reference may not match the planned file {}: {}",
                label, expected, reference
            ));
        }
        let current_dir = parent(Path::new(self.current));
        let resolved = normalize(current_dir, reference);
        if parent(&resolved) != parent(Path::new(expected)) {
            self.report.warnings.push(format!(
                "{} reference path may be inconsistent with the project structure: {}",
                label, reference
            ));
            self.suggest(&format!("Suggested {} path", label), file_type);
        }
    }

    fn html(&mut self, content: &str) {
        for caps in HTML_CSS.captures_iter(content) {
            self.asset("CSS", &caps[1], FileKind::Css, "css");
        }
        for caps in HTML_JS.captures_iter(content) {
            self.asset("JS", &caps[1], FileKind::Js, "js");
        }
        for caps in NAV_LINK.captures_iter(content) {
            let link = &caps[1];
            if is_external(link) {
                self.report
                    .warnings
                    .push(format!("Navigation link uses an external URL: {}", link));
            } else if link.starts_with('/') {
                self.report.errors.push(format!(
                    "Navigation link uses an absolute path: {} (use a relative path)",
                    link
                ));
                self.suggest("Change the navigation link to", "html");
            }
        }
    }

    fn js(&mut self, content: &str) {
        for caps in JS_DATA.captures_iter(content) {
            let reference = &caps[1];
            if reference.starts_with("/api/") {
                self.report.errors.push(format!(
                    "Data reference uses an API path: {} (load a local data file instead)",
                    reference
                ));
                self.suggest("Use the local data file", "json");
            } else {
                self.asset("Data", reference, FileKind::Json, "json");
            }
        }
        for caps in JS_NAVIGATION.captures_iter(content) {
            let target = &caps[1];
            if is_external(target) {
                self.report
                    .warnings
                    .push(format!("Navigation target uses an external URL: {}", target));
            } else if target.starts_with('/') {
                self.report.errors.push(format!(
                    "Navigation target uses an absolute path: {} (use a relative path)",
                    target
                ));
                self.suggest("Change the navigation target to", "html");
            } else if target.contains('/') && !target.contains(".html") {
                self.report.warnings.push(format!(
                    "Navigation target '{}' looks like a route; link to a page with a query string instead",
                    target
                ));
                self.report
                    .suggestions
                    .push("Use the form 'page.html?id=<id>'".to_string());
            }
        }
    }
}

/// Check the links of one written HTML or JS file
pub fn check_links(
    current: &str,
    content: &str,
    related: &RelatedFiles,
    knowledge: &KnowledgeBase,
) -> LinkReport {
    let mut checker = LinkChecker {
        current,
        related,
        knowledge,
        report: LinkReport::default(),
    };
    match FileKind::from_path(Path::new(current)) {
        FileKind::Html => checker.html(content),
        FileKind::Js => checker.js(content),
        _ => {}
    }
    let mut report = checker.report;
    report.valid = report.errors.is_empty();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::planner::default_plan;

    fn web_plan() -> Plan {
        default_plan("a responsive website")
    }

    #[test]
    fn test_related_files_for_default_web_plan() {
        let related = find_related_web_files("index.html", &web_plan());
        // root-level file: every directory is nested under it
        assert_eq!(related.css.as_deref(), Some("css/style.css"));
        assert_eq!(related.json.as_deref(), Some("data/items.json"));
        assert_eq!(related.html.as_deref(), Some("detail.html"));
        assert!(related.js.is_some());
    }

    #[test]
    fn test_logical_rules() {
        assert!(logically_related(Path::new("a/main.js"), Path::new("b/config.json"), FileRole::General));
        assert!(logically_related(Path::new("a/x.js"), Path::new("b/items.json"), FileRole::Data));
        assert!(!logically_related(Path::new("a/x.js"), Path::new("b/items.json"), FileRole::Logic));
        assert!(logically_related(Path::new("pages/a.html"), Path::new("css/styles.css"), FileRole::Style));
        assert!(logically_related(Path::new("js/a.js"), Path::new("site/index.html"), FileRole::EntryPoint));
        assert!(!logically_related(Path::new("js/a.js"), Path::new("site/index.html"), FileRole::View));
    }

    #[test]
    fn test_sibling_directories_need_a_rule() {
        let mut plan = web_plan();
        plan.task_list[0].files.push(crate::agents::FileSpec::new(
            "vendor/theme.css",
            "",
            FileRole::Style,
        ));
        let related = find_related_web_files("js/detail-page.js", &plan);
        assert_eq!(related.json.as_deref(), Some("data/items.json"));
        assert!(related.css.is_none());
    }

    #[test]
    fn test_html_absolute_and_mismatched_links() {
        let related = RelatedFiles {
            css: Some("css/style.css".into()),
            js: Some("js/main.js".into()),
            ..RelatedFiles::default()
        };
        let html = r#"<link href="/css/style.css"><script src="js/app.js"></script><a href="detail.html">x</a>"#;
        let report = check_links("index.html", html, &related, &KnowledgeBase::new());

        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2); // css reference and the same href as a navigation link
        assert!(report.warnings.iter().any(|w| w.contains("may not match")));
        assert!(report.suggestions.iter().any(|s| s.ends_with("css/file.css")));
    }

    #[test]
    fn test_html_consistent_links_pass() {
        let related = RelatedFiles {
            css: Some("css/style.css".into()),
            js: Some("js/main.js".into()),
            ..RelatedFiles::default()
        };
        let html = r#"<link href="css/style.css"><script src="js/main.js"></script>"#;
        let report = check_links("index.html", html, &related, &KnowledgeBase::new());
        assert!(report.valid);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_js_data_and_navigation() {
        let related = RelatedFiles {
            json: Some("data/items.json".into()),
            ..RelatedFiles::default()
        };
        let js = r#"
            fetch('/api/items.json');
            fetch('../data/items.json');
            window.location.href = 'items/42';
            window.location.href = 'https://example.com';
        "#;
        let report = check_links("js/main.js", js, &related, &KnowledgeBase::new());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("API path"));
        assert_eq!(report.warnings.len(), 2);
        assert!(report.suggestions.iter().any(|s| s.contains("page.html?id=")));
    }

    #[test]
    fn test_suggested_path_fallbacks() {
        let kb = KnowledgeBase::new();
        assert_eq!(suggested_path("index.html", "html", &kb), "./index.html");
        assert_eq!(suggested_path("index.html", "css", &kb), "css/file.css");
    }
}
