//! HTML, CSS and JS structure extraction for the knowledge base.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use super::WebFileInfo;

static LINK_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<link[^>]+href=["']([^"']+\.css)["']"#).unwrap());
static SCRIPT_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<script[^>]+src=["']([^"']+\.js)["']"#).unwrap());
static IMAGE_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src=["']([^"']+\.(?:png|jpg|jpeg|gif|svg))["']"#).unwrap()
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)").unwrap());
static ID_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)id=["']([^"']+)["']"#).unwrap());
static CLASS_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"class=["']([^"']+)["']"#).unwrap());

static CSS_SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^{};]+)\{").unwrap());
static CSS_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"@import\s+(?:url\()?["']?([^"')\s;]+)["']?\)?"#).unwrap());
static CSS_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"url\(["']?([^"')]+)["']?\)"#).unwrap());

static JS_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:function\s+([a-zA-Z_$][\w$]*)|(?:const|let|var)\s+([a-zA-Z_$][\w$]*)\s*=\s*(?:async\s*)?(?:function|\([^)]*\)\s*=>))").unwrap()
});
static JS_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"class\s+([a-zA-Z_$][\w$]*)").unwrap());
static JS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:import\s+[^'"]*from\s+|import\s+|require\s*\(\s*)["']([^"']+)["']"#).unwrap()
});
static JS_FETCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:fetch|\$\.ajax|axios\.get|axios\.post)\s*\(\s*["']([^"']+)["']"#).unwrap()
});

fn captures(re: &Regex, content: &str) -> Vec<String> {
    re.captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

pub fn html(file_path: &str, content: &str) -> WebFileInfo {
    let css = captures(&LINK_HREF, content);
    let js = captures(&SCRIPT_SRC, content);
    let images = captures(&IMAGE_SRC, content);

    let mut elements = dedup(
        TAG.captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .collect(),
    );
    elements.extend(captures(&ID_ATTR, content).into_iter().map(|id| format!("#{}", id)));
    elements.extend(dedup(
        captures(&CLASS_ATTR, content)
            .iter()
            .flat_map(|c| c.split_whitespace())
            .map(|c| format!(".{}", c))
            .collect(),
    ));

    let dependencies = css.iter().chain(js.iter()).cloned().collect();
    let references = css.into_iter().chain(js).chain(images).collect();

    WebFileInfo {
        file_path: file_path.to_string(),
        file_type: "html".into(),
        references,
        elements,
        dependencies,
    }
}

pub fn css(file_path: &str, content: &str) -> WebFileInfo {
    let elements = dedup(
        captures(&CSS_SELECTOR, content)
            .into_iter()
            .filter(|s| !s.is_empty())
            .filter(|s| !["@media", "@keyframes", "@import"].iter().any(|at| s.starts_with(at)))
            .collect(),
    );
    let imports = captures(&CSS_IMPORT, content);
    let mut references = imports.clone();
    references.extend(captures(&CSS_URL, content));

    WebFileInfo {
        file_path: file_path.to_string(),
        file_type: "css".into(),
        references: dedup(references),
        elements,
        dependencies: imports,
    }
}

pub fn js(file_path: &str, content: &str) -> WebFileInfo {
    let mut elements: Vec<String> = JS_FUNCTION
        .captures_iter(content)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| format!("function:{}", m.as_str()))
        .collect();
    elements.extend(captures(&JS_CLASS, content).into_iter().map(|c| format!("class:{}", c)));

    let imports = captures(&JS_IMPORT, content);
    let mut references = imports.clone();
    references.extend(captures(&JS_FETCH, content));

    WebFileInfo {
        file_path: file_path.to_string(),
        file_type: "js".into(),
        references: dedup(references),
        elements: dedup(elements),
        dependencies: imports,
    }
}

/// Types without a dedicated extractor keep only their identity
pub fn basic(file_path: &str, file_type: &str) -> WebFileInfo {
    WebFileInfo {
        file_path: file_path.to_string(),
        file_type: file_type.to_string(),
        ..WebFileInfo::default()
    }
}
