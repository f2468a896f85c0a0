//! # Python Validation
//!
//! Syntax via tree-sitter, then dependency, function-interface and style
//! checks driven by pattern matching. Only syntax errors make a report
//! invalid; everything else is advisory.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::{read_source, ValidationReport};
use crate::tools::executor::PackageProbe;

static IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*import\s+([a-zA-Z0-9_.]+)").unwrap());
static FROM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*from\s+([a-zA-Z0-9_.]+)\s+import").unwrap());
pub(crate) static FUNCTION_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(async\s+)?def\s+([a-zA-Z_]\w*)\s*\(([^)]*)\)\s*(->\s*[^:]+)?:").unwrap()
});

const MAX_LINE_LENGTH: usize = 100;

/// Well-known standard library roots; the environment is not consulted
static STDLIB: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "binascii",
        "bisect", "builtins", "bz2", "calendar", "cmd", "code", "codecs", "codeop",
        "collections", "colorsys", "compileall", "concurrent", "configparser", "contextlib",
        "contextvars", "copy", "cProfile", "csv", "ctypes", "dataclasses", "datetime",
        "decimal", "difflib", "dis", "distutils", "doctest", "email", "ensurepip", "enum",
        "errno", "faulthandler", "fnmatch", "fractions", "functools", "gc", "getpass",
        "gettext", "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http", "imp",
        "importlib", "inspect", "io", "ipaddress", "itertools", "json", "keyword", "locale",
        "logging", "lzma", "marshal", "math", "mimetypes", "modulefinder", "multiprocessing",
        "numbers", "operator", "os", "pathlib", "pdb", "pickle", "pkg_resources", "pkgutil",
        "platform", "pprint", "profile", "py_compile", "queue", "random", "re", "runpy",
        "sched", "secrets", "select", "selectors", "setuptools", "shelve", "shlex", "shutil",
        "signal", "site", "smtplib", "socket", "sqlite3", "ssl", "stat", "statistics",
        "string", "struct", "subprocess", "sys", "tarfile", "tempfile", "textwrap",
        "threading", "time", "timeit", "tkinter", "token", "tokenize", "traceback", "types",
        "typing", "typing_extensions", "unicodedata", "unittest", "urllib", "uuid", "venv",
        "warnings", "weakref", "webbrowser", "xml", "zipfile", "zipimport", "zlib", "zoneinfo",
    ]
    .into_iter()
    .collect()
});

/// True when the root of `module` is a standard library module
pub fn is_standard_library(module: &str) -> bool {
    let root = module.split('.').next().unwrap_or(module);
    STDLIB.contains(root) || root.starts_with("__")
}

/// Function signature recovered by pattern matching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub is_async: bool,
    pub parameters: Vec<String>,
    pub return_type: Option<String>,
    /// 1-based
    pub line: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PythonReport {
    #[serde(flatten)]
    pub report: ValidationReport,
    pub syntax_errors: Vec<String>,
    pub dependency_issues: Vec<String>,
    pub function_issues: Vec<String>,
    pub style_issues: Vec<String>,
    pub functions: Vec<FunctionSignature>,
    pub imports: Vec<String>,
    /// Every issue with its category prefix
    pub issues: Vec<String>,
}

// ============================================================================
// Syntax
// ============================================================================

/// Parse Python source with tree-sitter
pub(crate) fn parse(content: &str) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
        tracing::warn!("Failed to load Python grammar: {}", e);
        return None;
    }
    parser.parse(content, None)
}

/// First syntax error, if any
pub fn syntax_error(content: &str) -> Option<String> {
    let tree = parse(content)?;
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut cursor = root.walk();
    let node = find_error_node(&mut cursor)?;
    let line = node.start_position().row + 1;
    if node.is_missing() {
        return Some(format!("Syntax error at line {}: missing '{}'", line, node.kind()));
    }
    let snippet: String = node
        .utf8_text(content.as_bytes())
        .unwrap_or("")
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(40)
        .collect();
    Some(format!(
        "Syntax error at line {}: invalid syntax near '{}'",
        line,
        snippet.trim()
    ))
}

fn find_error_node<'t>(cursor: &mut tree_sitter::TreeCursor<'t>) -> Option<tree_sitter::Node<'t>> {
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            if let Some(found) = find_error_node(cursor) {
                return Some(found);
            }
            cursor.goto_parent();
        }
        if !cursor.goto_next_sibling() {
            return None;
        }
    }
}

// ============================================================================
// Imports and dependencies
// ============================================================================

/// Module names from `import x` and `from x import y`, in source order
pub fn extract_imports(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            IMPORT
                .captures(line)
                .or_else(|| FROM_IMPORT.captures(line))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// Whether `<dir>/<module>.py` or `<dir>/<module>/__init__.py` exists
pub(crate) fn local_module_exists(dir: &Path, module: &str) -> bool {
    dir.join(format!("{}.py", module)).exists() || dir.join(module).join("__init__.py").exists()
}

fn check_dependencies(imports: &[String], file_path: &Path, probe: &dyn PackageProbe) -> Vec<String> {
    let dir = file_path.parent().unwrap_or_else(|| Path::new("."));
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for import in imports {
        if let Some(relative) = import.strip_prefix('.') {
            let target = relative.trim_start_matches('.').split('.').next().unwrap_or("");
            if !target.is_empty() && !local_module_exists(dir, target) {
                issues.push(format!("Relative import may be invalid: {}", import));
            }
            continue;
        }
        let root = import.split('.').next().unwrap_or(import);
        if is_standard_library(root) || local_module_exists(dir, root) || !seen.insert(root) {
            continue;
        }
        if !probe.is_installed(root) {
            issues.push(format!("Missing package: {}", root));
        }
    }
    issues
}

// ============================================================================
// Functions and style
// ============================================================================

/// Signatures plus interface issues
pub fn analyze_functions(content: &str) -> (Vec<FunctionSignature>, Vec<String>) {
    let mut functions = Vec::new();
    let mut issues = Vec::new();

    for caps in FUNCTION_DEF.captures_iter(content) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let name = name.as_str().to_string();
        let parameters = split_parameters(caps.get(3).map_or("", |m| m.as_str()));
        let return_type = caps
            .get(4)
            .map(|m| m.as_str().trim_start_matches("->").trim().to_string());

        let has_cased = name.chars().any(|c| c.is_alphabetic());
        let is_lower = has_cased && !name.chars().any(|c| c.is_uppercase());
        if !is_lower && !name.starts_with('_') {
            issues.push(format!(
                "Function name '{}' should be lowercase with underscores",
                name
            ));
        }
        if return_type.is_none() && name != "__init__" {
            issues.push(format!("Function '{}' missing return type annotation", name));
        }
        for param in &parameters {
            if !param.contains(':') && !is_exempt_parameter(param) {
                issues.push(format!(
                    "Parameter '{}' in function '{}' missing type annotation",
                    param, name
                ));
            }
        }

        functions.push(FunctionSignature {
            line: content[..whole.start()].matches('\n').count() + 1,
            is_async: caps.get(1).is_some(),
            name,
            parameters,
            return_type,
        });
    }

    if functions.is_empty() {
        issues.push("No function definitions found".to_string());
    }
    (functions, issues)
}

pub(crate) fn split_parameters(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_exempt_parameter(param: &str) -> bool {
    matches!(param, "self" | "cls" | "*args" | "**kwargs" | "*" | "/")
}

fn check_style(content: &str) -> Vec<String> {
    let mut issues = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let length = line.chars().count();
        if length > MAX_LINE_LENGTH {
            issues.push(format!(
                "Line {} is too long ({} characters > {})",
                i + 1,
                length,
                MAX_LINE_LENGTH
            ));
        }
    }
    for (i, line) in content.lines().enumerate() {
        if line.starts_with('\t') {
            issues.push(format!("Line {} uses tabs instead of spaces", i + 1));
        }
    }
    if content.lines().next().is_some_and(|l| l.trim().is_empty()) {
        issues.push("File starts with empty line".to_string());
    }
    issues
}

// ============================================================================
// Entry points
// ============================================================================

/// Full validation of one Python source
pub fn validate(content: &str, file_path: &Path, probe: &dyn PackageProbe) -> PythonReport {
    let mut report = ValidationReport::new();
    let mut issues = Vec::new();

    let syntax_errors: Vec<String> = syntax_error(content).into_iter().collect();
    for e in &syntax_errors {
        report.error(e.clone());
        issues.push(format!("Syntax: {}", e));
    }

    let imports = extract_imports(content);
    let dependency_issues = check_dependencies(&imports, file_path, probe);
    let (functions, function_issues) = analyze_functions(content);
    let style_issues = check_style(content);

    for (prefix, list) in [
        ("Dependency", &dependency_issues),
        ("Function", &function_issues),
        ("Style", &style_issues),
    ] {
        for issue in list {
            let line = format!("{}: {}", prefix, issue);
            report.warn(line.clone());
            issues.push(line);
        }
    }

    PythonReport {
        report,
        syntax_errors,
        dependency_issues,
        function_issues,
        style_issues,
        functions,
        imports,
        issues,
    }
}

pub fn validate_file(path: &Path, probe: &dyn PackageProbe) -> PythonReport {
    match read_source(path) {
        Ok(content) => validate(&content, path, probe),
        Err(report) => PythonReport {
            syntax_errors: report.errors.clone(),
            issues: report.errors.clone(),
            report,
            ..PythonReport::default()
        },
    }
}
