//! HTML structure, id extraction and asset references.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use super::{read_source, ValidationReport};

static DOCTYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!DOCTYPE\s+html>").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html[^>]*>").unwrap());
static HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<head[^>]*>.*</head>").unwrap());
static BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<body[^>]*>.*</body>").unwrap());
static ID_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)id=["']([^"']+)["']"#).unwrap());
static CSS_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<link[^>]+href=["']([^"']+\.css)["']"#).unwrap());
static JS_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<script[^>]+src=["']([^"']+\.js)["']"#).unwrap());
static IMG_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).unwrap());
static OPEN_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)[^>]*>").unwrap());
static CLOSE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</([a-zA-Z][a-zA-Z0-9]*)>").unwrap());

/// Void elements that never have a closing tag
const SELF_CLOSING: &[&str] = &[
    "img", "br", "hr", "input", "meta", "link", "area", "base", "col", "embed", "param",
    "source", "track", "wbr",
];

/// Asset references grouped by type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HtmlRefs {
    pub css: Vec<String>,
    pub js: Vec<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HtmlReport {
    #[serde(flatten)]
    pub report: ValidationReport,
    pub element_ids: BTreeSet<String>,
    pub external_refs: HtmlRefs,
    pub missing_files: HtmlRefs,
}

/// Validate markup; when `base_dir` is given, local references must exist
/// relative to it
pub fn validate(content: &str, base_dir: Option<&Path>) -> HtmlReport {
    let mut report = ValidationReport::new();

    if !DOCTYPE.is_match(content) {
        report.warn("Missing DOCTYPE declaration");
    }
    if !HTML_TAG.is_match(content) {
        report.error("Missing <html> tag");
    }
    if !HEAD.is_match(content) {
        report.warn("Missing or empty <head> section");
    }
    if !BODY.is_match(content) {
        report.error("Missing <body> section");
    }

    let element_ids = capture_all(&ID_ATTR, content).into_iter().collect();
    let external_refs = HtmlRefs {
        css: capture_all(&CSS_REF, content),
        js: capture_all(&JS_REF, content),
        images: capture_all(&IMG_REF, content),
    };

    let mut missing_files = HtmlRefs::default();
    for (label, refs, missing) in [
        ("CSS", &external_refs.css, &mut missing_files.css),
        ("JS", &external_refs.js, &mut missing_files.js),
    ] {
        for reference in refs {
            if is_external(reference) {
                report.warn(format!("External {} reference: {}", label, reference));
            } else if reference.starts_with('/') {
                report.error(format!(
                    "Absolute path not allowed for {} reference: {} (use a relative path such as '{}')",
                    label,
                    reference,
                    reference.trim_start_matches('/')
                ));
            } else if let Some(base) = base_dir {
                if !base.join(reference.trim_start_matches("./")).exists() {
                    missing.push(reference.clone());
                    report.error(format!("Referenced {} file not found: {}", label, reference));
                }
            }
        }
    }
    if let Some(base) = base_dir {
        for image in &external_refs.images {
            if !is_external(image)
                && !image.starts_with("data:")
                && !base.join(image.trim_start_matches('/')).exists()
            {
                missing_files.images.push(image.clone());
                report.warn(format!("Referenced image may not exist: {}", image));
            }
        }
    }

    let open = OPEN_TAG
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .filter(|m| !SELF_CLOSING.contains(&m.as_str().to_ascii_lowercase().as_str()))
        .count();
    let close = CLOSE_TAG.captures_iter(content).count();
    if open != close {
        report.warn(format!(
            "Possible tag mismatch: {} opening tags, {} closing tags",
            open, close
        ));
    }

    HtmlReport {
        report,
        element_ids,
        external_refs,
        missing_files,
    }
}

/// Validate a file on disk, optionally checking local references against
/// its directory
pub fn validate_file(path: &Path, check_existence: bool) -> HtmlReport {
    match read_source(path) {
        Ok(content) => {
            let base = if check_existence { path.parent() } else { None };
            validate(&content, base)
        }
        Err(report) => HtmlReport {
            report,
            ..HtmlReport::default()
        },
    }
}

pub(crate) fn is_external(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://") || reference.starts_with("//")
}

fn capture_all(re: &Regex, content: &str) -> Vec<String> {
    re.captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <link rel="stylesheet" href="css/a.css">
</head>
<body>
  <ul id="item-list"></ul>
  <img src="images/logo.png">
  <script src="js/main.js"></script>
</body>
</html>"#;

    #[test]
    fn test_well_formed_page() {
        let result = validate(PAGE, None);
        assert!(result.report.valid, "{:?}", result.report.errors);
        assert!(result.report.warnings.is_empty(), "{:?}", result.report.warnings);
        assert!(result.element_ids.contains("item-list"));
        assert_eq!(result.external_refs.css, vec!["css/a.css"]);
        assert_eq!(result.external_refs.js, vec!["js/main.js"]);
        assert_eq!(result.external_refs.images, vec!["images/logo.png"]);
    }

    #[test]
    fn test_data_attributes_are_not_element_ids() {
        let page = r#"<body><li data-id="42" id="row"></li><a data-user-id='7'></a></body>"#;
        let result = validate(page, None);
        assert_eq!(result.element_ids.len(), 1);
        assert!(result.element_ids.contains("row"));
    }

    #[test]
    fn test_missing_body_is_error() {
        let result = validate("<html><head></head></html>", None);
        assert!(!result.report.valid);
        assert!(result.report.errors.contains(&"Missing <body> section".to_string()));
        assert!(result
            .report
            .warnings
            .contains(&"Missing DOCTYPE declaration".to_string()));
    }

    #[test]
    fn test_absolute_css_path_is_error() {
        let page = PAGE.replace("css/a.css", "/css/a.css");
        let result = validate(&page, None);
        assert!(!result.report.valid);
        assert!(result.report.errors.iter().any(|e| e.contains("Absolute path")));
    }

    #[test]
    fn test_relative_reference_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/a.css"), "body{}").unwrap();
        std::fs::create_dir_all(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/main.js"), "").unwrap();
        let index = dir.path().join("index.html");
        std::fs::write(&index, PAGE).unwrap();

        let result = validate_file(&index, true);
        assert!(result.report.errors.is_empty(), "{:?}", result.report.errors);
        assert_eq!(result.missing_files.images, vec!["images/logo.png"]);
    }

    #[test]
    fn test_missing_js_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/a.css"), "body{}").unwrap();
        let result = validate(PAGE, Some(dir.path()));
        assert_eq!(result.missing_files.js, vec!["js/main.js"]);
        assert!(!result.report.valid);
    }

    #[test]
    fn test_external_reference_is_warning() {
        let page = PAGE.replace("css/a.css", "https://cdn.example.com/a.css");
        let result = validate(&page, None);
        assert!(result.report.valid);
        assert!(result.report.warnings.iter().any(|w| w.contains("External CSS")));
    }

    #[test]
    fn test_tag_mismatch_warning() {
        let result = validate(
            "<!DOCTYPE html><html><head></head><body><div><p>x</div></body></html>",
            None,
        );
        assert!(result.report.valid);
        assert!(result.report.warnings.iter().any(|w| w.contains("tag mismatch")));
    }
}
