//! # Reference Resolution
//!
//! Resolves the asset paths an HTML or JS file points at against the set
//! of files known to the project.
//!
//! Resolution order for a reference:
//!
//! 1. exact entry in the path map (basenames and root-relative paths)
//! 2. relative to the referencing file's directory
//! 3. relative to the discovered project root
//! 4. any known file with the same basename

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use super::html::is_external;
use super::{read_source, FileKind};

pub(crate) static HTML_CSS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)href=["']([^"']+\.css)["']"#).unwrap());
pub(crate) static HTML_JS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)src=["']([^"']+\.js)["']"#).unwrap());
pub(crate) static JS_DATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:fetch|import)\(["']([^"']+\.json)["']"#).unwrap());

/// Files whose presence marks a project root
const ROOT_MARKERS: &[&str] = &[
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "README.md",
    ".git",
    "src",
    "public",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingRef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub missing_refs: Vec<MissingRef>,
    pub suggestions: Vec<String>,
}

// ============================================================================
// JS load order
// ============================================================================

/// Script buckets in their expected load order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptCategory {
    Core,
    Navigation,
    Utilities,
    Unknown,
}

/// Filename fragments per category, checked in this order
const SCRIPT_MATCH_TABLE: &[(ScriptCategory, &[&str])] = &[
    (ScriptCategory::Core, &["app.js", "main.js"]),
    (ScriptCategory::Navigation, &["navigation.js", "router.js"]),
    (ScriptCategory::Utilities, &["utils.js", "helpers.js"]),
];

impl ScriptCategory {
    pub fn classify(reference: &str) -> Self {
        let name = basename(reference);
        SCRIPT_MATCH_TABLE
            .iter()
            .find(|(_, fragments)| fragments.iter().any(|f| name.contains(f)))
            .map(|(category, _)| *category)
            .unwrap_or(ScriptCategory::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptCategory::Core => "core",
            ScriptCategory::Navigation => "navigation",
            ScriptCategory::Utilities => "utilities",
            ScriptCategory::Unknown => "unknown",
        }
    }
}

/// First load-order violation, if any, as (warning, suggestion)
pub fn check_script_order(scripts: &[String]) -> Option<(String, String)> {
    let categories: Vec<ScriptCategory> = scripts.iter().map(|s| ScriptCategory::classify(s)).collect();
    scripts
        .windows(2)
        .zip(categories.windows(2))
        .find(|(_, c)| c[0] > c[1])
        .map(|(s, c)| {
            (
                format!(
                    "JavaScript load order may be wrong: {} ({}) should load after {} ({})",
                    s[0],
                    c[0].as_str(),
                    s[1],
                    c[1].as_str()
                ),
                "Reorder script tags: core logic first, then navigation, then utilities".to_string(),
            )
        })
}

// ============================================================================
// Project root and path map
// ============================================================================

/// Common ancestor of the files' directories, or its parent when only the
/// parent carries a project marker
pub fn find_project_root(files: &[PathBuf]) -> Option<PathBuf> {
    let mut dirs = files.iter().map(|f| f.parent().unwrap_or_else(|| Path::new("")));
    let first = dirs.next()?.to_path_buf();
    let common = dirs.fold(first, |acc, dir| common_prefix(&acc, dir));

    let has_marker = |dir: &Path| ROOT_MARKERS.iter().any(|m| dir.join(m).exists());
    if has_marker(&common) {
        return Some(common);
    }
    if let Some(parent) = common.parent().filter(|p| has_marker(p)) {
        return Some(parent.to_path_buf());
    }
    Some(common)
}

fn common_prefix(a: &Path, b: &Path) -> PathBuf {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

/// Relative path from `from_dir` to `target`
pub fn relative_path(target: &Path, from_dir: &Path) -> PathBuf {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = from_dir.components().collect();
    let shared = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in shared..base.len() {
        out.push("..");
    }
    for c in &target[shared..] {
        out.push(c.as_os_str());
    }
    out
}

fn basename(reference: &str) -> &str {
    reference.rsplit(['/', '\\']).next().unwrap_or(reference)
}

/// Lookup keys (basename, root-relative path) -> known file
fn build_path_map(files: &[PathBuf], root: Option<&Path>) -> HashMap<String, PathBuf> {
    let mut map = HashMap::new();
    for file in files {
        if let Some(name) = file.file_name() {
            map.insert(name.to_string_lossy().to_string(), file.clone());
        }
        if let Some(root) = root {
            let rel = relative_path(file, root);
            map.insert(rel.to_string_lossy().replace('\\', "/"), file.clone());
        }
    }
    map
}

/// Whether `reference` from `source` resolves to an existing file
pub fn reference_exists(reference: &str, source: &Path, files: &[PathBuf]) -> bool {
    let root = find_project_root(files);
    let map = build_path_map(files, root.as_deref());
    resolve(reference, source, &map, root.as_deref()).is_some()
}

fn resolve(
    reference: &str,
    source: &Path,
    map: &HashMap<String, PathBuf>,
    root: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(mapped) = map.get(reference) {
        return mapped.exists().then(|| mapped.clone());
    }
    let cleaned = reference.trim_start_matches("./");
    let source_dir = source.parent().unwrap_or_else(|| Path::new(""));
    let local = source_dir.join(cleaned);
    if local.exists() {
        return Some(local);
    }
    if let Some(root) = root {
        let from_root = root.join(cleaned);
        if from_root.exists() {
            return Some(from_root);
        }
    }
    let name = basename(cleaned);
    map.values()
        .filter(|p| p.exists())
        .find(|p| p.file_name().is_some_and(|n| n.to_string_lossy() == name))
        .cloned()
}

/// Closest known file of `ext` whose name contains the reference's basename
fn suggest_path(reference: &str, source: &Path, files: &[PathBuf], ext: &str) -> Option<String> {
    let name = basename(reference);
    let source_dir = source.parent().unwrap_or_else(|| Path::new(""));
    files
        .iter()
        .filter(|f| f.extension().is_some_and(|e| e == ext))
        .filter(|f| f.file_name().is_some_and(|n| n.to_string_lossy().contains(name)))
        .map(|f| relative_path(f, source_dir).to_string_lossy().replace('\\', "/"))
        .min_by_key(|p| p.len())
}

/// Whether a reference sits in the conventional folder for its type
pub fn is_path_consistent(reference: &str, kind: FileKind) -> bool {
    let folder = match kind {
        FileKind::Css => "css/",
        FileKind::Js => "js/",
        FileKind::Json => "data/",
        _ => return true,
    };
    reference.contains(folder)
}

// ============================================================================
// Sweep
// ============================================================================

/// Check every asset reference of an HTML or JS file against `files`
pub fn check_references(path: &Path, files: &[PathBuf]) -> ReferenceReport {
    let mut report = ReferenceReport {
        valid: true,
        ..ReferenceReport::default()
    };
    let content = match read_source(path) {
        Ok(c) => c,
        Err(failure) => {
            report.valid = false;
            report.errors = failure.errors;
            return report;
        }
    };

    let root = find_project_root(files);
    let map = build_path_map(files, root.as_deref());
    let captures = |re: &Regex| -> Vec<String> {
        re.captures_iter(&content)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    };

    match FileKind::from_path(path) {
        FileKind::Html => {
            let scripts = captures(&HTML_JS);
            if let Some((warning, suggestion)) = check_script_order(&scripts) {
                report.warnings.push(warning);
                report.suggestions.push(suggestion);
            }
            for (kind, ext, refs) in [("css", "css", captures(&HTML_CSS)), ("js", "js", scripts)] {
                for reference in refs {
                    if is_external(&reference) {
                        continue;
                    }
                    if reference.starts_with('/') {
                        report.valid = false;
                        report.errors.push(format!(
                            "Absolute {} reference: {} (use a relative path)",
                            kind.to_uppercase(),
                            reference
                        ));
                        continue;
                    }
                    if resolve(&reference, path, &map, root.as_deref()).is_none() {
                        report.valid = false;
                        report.errors.push(format!(
                            "{} reference does not exist: {}",
                            kind.to_uppercase(),
                            reference
                        ));
                        report.missing_refs.push(MissingRef {
                            kind: kind.to_string(),
                            reference: reference.clone(),
                        });
                        if let Some(s) = suggest_path(&reference, path, files, ext) {
                            report.suggestions.push(format!("Suggested path: {}", s));
                        }
                    }
                }
            }
        }
        FileKind::Js => {
            for reference in captures(&JS_DATA) {
                if is_external(&reference) {
                    continue;
                }
                if resolve(&reference, path, &map, root.as_deref()).is_none() {
                    report
                        .warnings
                        .push(format!("Data file reference may not exist: {}", reference));
                    report.missing_refs.push(MissingRef {
                        kind: "data".to_string(),
                        reference: reference.clone(),
                    });
                    if let Some(s) = suggest_path(&reference, path, files, "json") {
                        report.suggestions.push(format!("Suggested path: {}", s));
                    }
                }
            }
        }
        _ => {}
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for sub in ["css", "js", "data"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }
        let files = vec![
            root.join("index.html"),
            root.join("css/style.css"),
            root.join("js/main.js"),
            root.join("js/utils.js"),
            root.join("data/items.json"),
        ];
        for f in &files[1..] {
            std::fs::write(f, "").unwrap();
        }
        (dir, files)
    }

    #[test]
    fn test_script_classification_table() {
        assert_eq!(ScriptCategory::classify("js/main.js"), ScriptCategory::Core);
        assert_eq!(ScriptCategory::classify("router.js"), ScriptCategory::Navigation);
        assert_eq!(ScriptCategory::classify("lib/helpers.js"), ScriptCategory::Utilities);
        assert_eq!(ScriptCategory::classify("vendor.js"), ScriptCategory::Unknown);
        assert_eq!(ScriptCategory::classify("item-list.js"), ScriptCategory::Unknown);
    }

    #[test]
    fn test_script_order_violation() {
        let scripts = vec!["js/utils.js".to_string(), "js/main.js".to_string()];
        let (warning, _) = check_script_order(&scripts).unwrap();
        assert!(warning.contains("js/utils.js (utilities)"));
        let ordered = vec!["js/main.js".to_string(), "js/navigation.js".to_string()];
        assert!(check_script_order(&ordered).is_none());
    }

    #[test]
    fn test_project_root_is_common_dir() {
        let (dir, files) = project();
        assert_eq!(find_project_root(&files).unwrap(), dir.path());
    }

    #[test]
    fn test_html_references_resolve() {
        let (_dir, files) = project();
        std::fs::write(
            &files[0],
            r#"<link href="css/style.css"><script src="js/main.js"></script><script src="./js/utils.js"></script>"#,
        )
        .unwrap();
        let report = check_references(&files[0], &files);
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_absolute_and_missing_references() {
        let (_dir, files) = project();
        std::fs::write(
            &files[0],
            r#"<link href="/css/style.css"><script src="js/app-main.js"></script>"#,
        )
        .unwrap();
        let report = check_references(&files[0], &files);
        assert!(!report.valid);
        assert!(report.errors[0].starts_with("Absolute CSS reference"));
        assert_eq!(report.missing_refs[0].reference, "js/app-main.js");
    }

    #[test]
    fn test_basename_fallback_and_suggestion() {
        let (_dir, files) = project();
        // Resolves through the basename fallback
        assert!(reference_exists("assets/style.css", &files[0], &files));
        assert_eq!(
            suggest_path("items.json", &files[2], &files, "json").as_deref(),
            Some("../data/items.json")
        );
    }

    #[test]
    fn test_basename_fallback_skips_unwritten_files() {
        let (dir, mut files) = project();
        files.push(dir.path().join("js/detail.js"));
        assert!(!reference_exists("lib/detail.js", &files[0], &files));

        std::fs::write(&files[5], "").unwrap();
        assert!(reference_exists("lib/detail.js", &files[0], &files));
    }

    #[test]
    fn test_js_data_reference_warns() {
        let (_dir, files) = project();
        std::fs::write(&files[2], "fetch('data/missing.json'); fetch('data/items.json');").unwrap();
        let report = check_references(&files[2], &files);
        assert!(report.valid);
        assert_eq!(report.warnings, vec!["Data file reference may not exist: data/missing.json"]);
    }

    #[test]
    fn test_path_consistency() {
        assert!(is_path_consistent("css/style.css", FileKind::Css));
        assert!(!is_path_consistent("style.css", FileKind::Css));
        assert!(is_path_consistent("anything", FileKind::Html));
    }
}
