//! Python structure extraction.
//!
//! Two strategies behind one entry point: a tree-sitter walk when the
//! source parses cleanly, and a pattern-matching fallback when it does not.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use super::{ClassInfo, FunctionInfo};
use crate::validation::python::{parse, split_parameters, FUNCTION_DEF};

static CLASS_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"class\s+([a-zA-Z_]\w*)\s*(?:\(([^)]*)\))?:").unwrap());

/// Which strategy produced an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    TreeSitter,
    Pattern,
}

/// Module-level functions and classes
pub struct Extraction {
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub strategy: Strategy,
}

pub fn extract(content: &str, file_path: &str) -> Extraction {
    match parse(content) {
        Some(tree) if !tree.root_node().has_error() => {
            let mut functions = Vec::new();
            let mut classes = Vec::new();
            let source = content.as_bytes();
            let root = tree.root_node();
            let mut cursor = root.walk();
            for child in root.named_children(&mut cursor) {
                match definition(child) {
                    Some(node) if node.kind() == "function_definition" => {
                        functions.push(function_info(node, source, file_path));
                    }
                    Some(node) if node.kind() == "class_definition" => {
                        classes.push(class_info(node, source, file_path));
                    }
                    _ => {}
                }
            }
            Extraction {
                functions,
                classes,
                strategy: Strategy::TreeSitter,
            }
        }
        _ => extract_with_patterns(content, file_path),
    }
}

/// Unwrap `@decorator` wrappers
fn definition(node: Node) -> Option<Node> {
    match node.kind() {
        "decorated_definition" => node.child_by_field_name("definition"),
        "function_definition" | "class_definition" => Some(node),
        _ => None,
    }
}

fn text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

fn function_info(node: Node, source: &[u8], file_path: &str) -> FunctionInfo {
    let name = node
        .child_by_field_name("name")
        .map(|n| text(n, source).to_string())
        .unwrap_or_default();

    let mut parameters = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            if matches!(param.kind(), "keyword_separator" | "positional_separator" | "comment") {
                continue;
            }
            let raw = text(param, source);
            let bare = raw.split([':', '=']).next().unwrap_or(raw).trim();
            if !bare.is_empty() {
                parameters.push(bare.to_string());
            }
        }
    }

    let return_type = node
        .child_by_field_name("return_type")
        .map(|n| text(n, source).to_string());
    let is_async = node.child(0).is_some_and(|c| c.kind() == "async");

    FunctionInfo {
        name,
        parameters,
        return_type,
        is_async,
        file_path: file_path.to_string(),
        line_number: node.start_position().row + 1,
        docstring: node
            .child_by_field_name("body")
            .and_then(|body| docstring(body, source)),
    }
}

fn class_info(node: Node, source: &[u8], file_path: &str) -> ClassInfo {
    let name = node
        .child_by_field_name("name")
        .map(|n| text(n, source).to_string())
        .unwrap_or_default();

    let mut base_classes = Vec::new();
    if let Some(bases) = node.child_by_field_name("superclasses") {
        let mut cursor = bases.walk();
        for base in bases.named_children(&mut cursor) {
            if matches!(base.kind(), "identifier" | "attribute") {
                base_classes.push(text(base, source).to_string());
            }
        }
    }

    let mut methods = Vec::new();
    let body = node.child_by_field_name("body");
    if let Some(body) = body {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            if let Some(def) = definition(child).filter(|d| d.kind() == "function_definition") {
                methods.push(function_info(def, source, file_path));
            }
        }
    }

    ClassInfo {
        name,
        methods,
        base_classes,
        file_path: file_path.to_string(),
        line_number: node.start_position().row + 1,
        docstring: body.and_then(|b| docstring(b, source)),
    }
}

/// Leading string literal of a block
fn docstring(body: Node, source: &[u8]) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0).filter(|n| n.kind() == "string")?;
    let raw = text(literal, source);
    let trimmed = raw
        .trim_start_matches(['r', 'R', 'u', 'U'])
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    Some(trimmed.to_string())
}

/// Best-effort extraction for sources that do not parse
fn extract_with_patterns(content: &str, file_path: &str) -> Extraction {
    let line_of = |offset: usize| content[..offset].matches('\n').count() + 1;

    let functions = FUNCTION_DEF
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(FunctionInfo {
                name: caps.get(2)?.as_str().to_string(),
                parameters: split_parameters(caps.get(3).map_or("", |m| m.as_str())),
                return_type: caps
                    .get(4)
                    .map(|m| m.as_str().trim_start_matches("->").trim().to_string()),
                is_async: caps.get(1).is_some(),
                file_path: file_path.to_string(),
                line_number: line_of(whole.start()),
                docstring: None,
            })
        })
        .collect();

    let classes = CLASS_DEF
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(ClassInfo {
                name: caps.get(1)?.as_str().to_string(),
                methods: Vec::new(),
                base_classes: caps
                    .get(2)
                    .map(|m| {
                        m.as_str()
                            .split(',')
                            .map(str::trim)
                            .filter(|b| !b.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
                file_path: file_path.to_string(),
                line_number: line_of(whole.start()),
                docstring: None,
            })
        })
        .collect();

    Extraction {
        functions,
        classes,
        strategy: Strategy::Pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"import os


async def fetch(url: str, *args, timeout: int = 5, **kwargs) -> dict:
    """Fetch a resource."""
    return {}


class Store(Base, abc.ABC):
    """Key-value store."""

    def __init__(self, path):
        self.path = path

    @property
    def size(self) -> int:
        return 0
"#;

    #[test]
    fn test_tree_sitter_extraction() {
        let result = extract(SOURCE, "store.py");
        assert_eq!(result.strategy, Strategy::TreeSitter);

        let fetch = &result.functions[0];
        assert_eq!(fetch.name, "fetch");
        assert!(fetch.is_async);
        assert_eq!(fetch.parameters, vec!["url", "*args", "timeout", "**kwargs"]);
        assert_eq!(fetch.return_type.as_deref(), Some("dict"));
        assert_eq!(fetch.docstring.as_deref(), Some("Fetch a resource."));
        assert_eq!(fetch.line_number, 4);

        let store = &result.classes[0];
        assert_eq!(store.base_classes, vec!["Base", "abc.ABC"]);
        assert_eq!(store.methods.len(), 2);
        assert_eq!(store.methods[1].name, "size");
        assert_eq!(store.docstring.as_deref(), Some("Key-value store."));
    }

    #[test]
    fn test_pattern_fallback_on_broken_source() {
        let broken = "def ok(a, b) -> int:\n    return a +\n\nclass Thing(Base):\n    pass\n";
        let result = extract(broken, "thing.py");
        assert_eq!(result.strategy, Strategy::Pattern);
        assert_eq!(result.functions[0].name, "ok");
        assert_eq!(result.functions[0].parameters, vec!["a", "b"]);
        assert_eq!(result.classes[0].name, "Thing");
        assert_eq!(result.classes[0].line_number, 4);
    }
}
