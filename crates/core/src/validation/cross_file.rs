//! # Cross-File Consistency
//!
//! Checks that only make sense across several artifacts: DOM ids the
//! script looks up, JSON collections the script reads, and Python calls
//! into sibling modules.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use super::python::{analyze_functions, extract_imports, is_standard_library, local_module_exists, FunctionSignature};
use super::{html, js, json};

static CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-zA-Z0-9_.]+)\s*\(([^)]*)\)").unwrap());
static DEF_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(async\s+)?def\s+").unwrap());

const SKIPPED_BUILTINS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "list", "dict", "set",
];

// ============================================================================
// Web
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossFileReport {
    pub consistent: bool,
    pub issues: Vec<String>,
    pub html_ids: BTreeSet<String>,
    pub js_used_ids: BTreeSet<String>,
    pub missing_ids: BTreeSet<String>,
}

/// HTML ids vs JS lookups, plus JSON array accessors when a JSON file is given
pub fn check_web_consistency(
    html_path: &Path,
    js_path: &Path,
    json_path: Option<&Path>,
    syntax_check: bool,
) -> CrossFileReport {
    let mut issues = Vec::new();

    let html_result = html::validate_file(html_path, false);
    issues.extend(html_result.report.errors.iter().map(|e| format!("HTML: {}", e)));

    let js_result = js::validate_file(js_path, Some(&html_result.element_ids), syntax_check);
    issues.extend(js_result.report.errors.iter().map(|e| format!("JS: {}", e)));
    if !js_result.missing_ids.is_empty() {
        issues.push(format!(
            "JS references non-existent HTML IDs: {}",
            js_result.missing_ids.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    if let Some(json_path) = json_path.filter(|p| p.exists()) {
        let json_result = json::validate_file(json_path);
        issues.extend(json_result.report.errors.iter().map(|e| format!("JSON: {}", e)));
        let script = std::fs::read_to_string(js_path).unwrap_or_default();
        issues.extend(missing_accessors(&json_result.array_keys(), &script));
    }

    CrossFileReport {
        consistent: issues.is_empty(),
        issues,
        html_ids: html_result.element_ids,
        js_used_ids: js_result.used_ids,
        missing_ids: js_result.missing_ids,
    }
}

/// One issue per JSON array key the script never touches
pub fn missing_accessors(array_keys: &[String], script: &str) -> Vec<String> {
    array_keys
        .iter()
        .filter(|key| {
            let dotted = format!(".{}", key);
            let double = format!("[\"{}\"]", key);
            let single = format!("['{}']", key);
            !(script.contains(&dotted) || script.contains(&double) || script.contains(&single))
        })
        .map(|key| format!("JS may not access JSON array '{}' (expected 'data.{}')", key, key))
        .collect()
}

// ============================================================================
// Python
// ============================================================================

/// A call site resolved against a project function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub file_path: String,
    pub module: Option<String>,
    pub function: String,
    pub arguments: Vec<String>,
    pub matched_function: String,
    pub line: usize,
    pub valid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PythonCrossFileReport {
    pub consistent: bool,
    pub issues: Vec<String>,
    /// module -> project modules it imports
    pub module_dependencies: BTreeMap<String, Vec<String>>,
    pub function_calls: Vec<FunctionCall>,
}

struct ModuleSource {
    path: PathBuf,
    name: String,
    imports: Vec<String>,
    content: String,
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Module map, relative-import sanity, and call arity/literal-type checks
/// for calls into project modules
pub fn check_python_project(paths: &[PathBuf]) -> PythonCrossFileReport {
    let mut report = PythonCrossFileReport::default();
    let mut modules = Vec::new();
    let mut definitions: HashMap<String, FunctionSignature> = HashMap::new();

    for path in paths {
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let name = module_name(path);
        let (functions, _) = analyze_functions(&content);
        for f in functions {
            definitions.insert(format!("{}.{}", name, f.name), f);
        }
        modules.push(ModuleSource {
            path: path.clone(),
            imports: extract_imports(&content),
            name,
            content,
        });
    }
    let project: BTreeSet<&str> = modules.iter().map(|m| m.name.as_str()).collect();

    for module in &modules {
        let deps = report
            .module_dependencies
            .entry(module.name.clone())
            .or_default();
        let dir = module.path.parent().unwrap_or_else(|| Path::new("."));
        for import in &module.imports {
            let root = import.trim_start_matches('.').split('.').next().unwrap_or("");
            if project.contains(root) && !deps.iter().any(|d| d == root) {
                deps.push(root.to_string());
            }
            if import.starts_with('.') && !root.is_empty() && !local_module_exists(dir, root) {
                report.issues.push(format!(
                    "File {}: Invalid relative import {}",
                    module.path.display(),
                    import
                ));
            }
        }
    }

    for module in &modules {
        let file = module.path.display().to_string();
        for call in extract_calls(&module.content) {
            let candidates: Vec<String> = match &call.module {
                Some(m) => vec![format!("{}.{}", m, call.function)],
                None => module
                    .imports
                    .iter()
                    .map(|i| i.trim_start_matches('.').split('.').next().unwrap_or(""))
                    .filter(|root| project.contains(root))
                    .map(|root| format!("{}.{}", root, call.function))
                    .collect(),
            };
            // Calls into stdlib or third-party modules are out of reach
            if let Some(m) = &call.module {
                if is_standard_library(m) || !project.contains(m.as_str()) {
                    continue;
                }
            }
            let Some((key, definition)) = candidates
                .iter()
                .find_map(|k| definitions.get(k).map(|d| (k.clone(), d)))
            else {
                if call.module.is_some() {
                    report.issues.push(format!(
                        "File {} line {}: Function call '{}' from module '{}' has no matching definition",
                        file,
                        call.line,
                        call.function,
                        call.module.as_deref().unwrap_or("")
                    ));
                }
                continue;
            };

            let call_issues = check_call(definition, &call.arguments, call.line, &file);
            report.issues.extend(call_issues.iter().cloned());
            report.function_calls.push(FunctionCall {
                file_path: file.clone(),
                module: call.module.clone(),
                function: call.function.clone(),
                arguments: call.arguments.clone(),
                matched_function: key,
                line: call.line,
                valid: call_issues.is_empty(),
            });
        }
    }

    report.consistent = report.issues.is_empty();
    report
}

struct CallSite {
    module: Option<String>,
    function: String,
    arguments: Vec<String>,
    line: usize,
}

fn extract_calls(content: &str) -> Vec<CallSite> {
    let mut calls = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || DEF_LINE.is_match(line) {
            continue;
        }
        for caps in CALL.captures_iter(line) {
            let Some(full) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let (module, function) = match full.rsplit_once('.') {
                Some((m, f)) => (Some(m.to_string()), f.to_string()),
                None => (None, full.to_string()),
            };
            if function.is_empty() || SKIPPED_BUILTINS.contains(&function.as_str()) {
                continue;
            }
            if let Some(m) = &module {
                if m == "self" || m == "cls" || m.contains('.') {
                    continue;
                }
            }
            let arguments = caps
                .get(2)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            calls.push(CallSite {
                module,
                function,
                arguments,
                line: idx + 1,
            });
        }
    }
    calls
}

fn check_call(definition: &FunctionSignature, arguments: &[String], line: usize, file: &str) -> Vec<String> {
    let mut issues = Vec::new();
    let mut required = 0;
    let mut variadic = false;
    for param in &definition.parameters {
        let name = param.split(':').next().unwrap_or("").trim();
        if name == "self" || name == "cls" {
            continue;
        }
        if name.starts_with('*') {
            variadic = true;
            continue;
        }
        if !param.contains('=') {
            required += 1;
        }
    }
    if !variadic && arguments.len() < required {
        issues.push(format!(
            "File {} line {}: Function call missing required arguments. Expected at least {}, got {}",
            file,
            line,
            required,
            arguments.len()
        ));
    }

    let positional = definition
        .parameters
        .iter()
        .filter(|p| !matches!(p.split(':').next().map(str::trim), Some("self") | Some("cls")));
    for (i, (param, arg)) in positional.zip(arguments).enumerate() {
        let Some((name, annotation)) = param.split_once(':') else {
            continue;
        };
        let annotation = annotation.split('=').next().unwrap_or("").trim();
        let name = name.trim();
        if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_digit()) {
            if !matches!(annotation, "int" | "float" | "number" | "Union[int, float]") {
                issues.push(format!(
                    "File {} line {}: Argument {} '{}' expected type {}, got int",
                    file,
                    line,
                    i + 1,
                    name,
                    annotation
                ));
            }
        } else if (arg.starts_with('"') || arg.starts_with('\''))
            && !matches!(annotation, "str" | "Union[str, int]")
        {
            issues.push(format!(
                "File {} line {}: Argument {} '{}' expected type {}, got str",
                file,
                line,
                i + 1,
                name,
                annotation
            ));
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_accessors_generalized() {
        let keys = vec!["papers".to_string(), "tags".to_string()];
        let script = "const list = data.papers.map(p => p.title);";
        let issues = missing_accessors(&keys, script);
        assert_eq!(
            issues,
            vec!["JS may not access JSON array 'tags' (expected 'data.tags')"]
        );
        assert!(missing_accessors(&keys, "x['tags']; y[\"papers\"]").is_empty());
    }

    #[test]
    fn test_web_consistency_reports_ids_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let html = write(
            dir.path(),
            "index.html",
            "<html><body><div id=\"list\"></div></body></html>",
        );
        let js = write(
            dir.path(),
            "main.js",
            "fetch('items.json').then(r => r.json()).then(d => document.getElementById('grid'));",
        );
        let json = write(dir.path(), "items.json", r#"{"items": [{"id": 1}]}"#);

        let result = check_web_consistency(&html, &js, Some(&json), false);
        assert!(!result.consistent);
        assert!(result.issues.contains(&"JS references non-existent HTML IDs: grid".to_string()));
        assert!(result.issues.iter().any(|i| i.contains("JSON array 'items'")));
    }

    #[test]
    fn test_python_project_call_checks() {
        let dir = tempfile::tempdir().unwrap();
        let utils = write(
            dir.path(),
            "utils.py",
            "def scale(value: int, factor: int) -> int:\n    return value * factor\n",
        );
        let main = write(
            dir.path(),
            "main.py",
            "import os\nimport utils\nfrom .gone import x\n\ndef run() -> None:\n    utils.scale(3)\n    utils.scale('a', 2)\n    os.getcwd()\n",
        );

        let result = check_python_project(&[utils, main]);
        assert!(!result.consistent);
        assert_eq!(result.module_dependencies["main"], vec!["utils"]);
        assert!(result
            .issues
            .iter()
            .any(|i| i.contains("Expected at least 2, got 1")));
        assert!(result
            .issues
            .iter()
            .any(|i| i.contains("Argument 1 'value' expected type int, got str")));
        assert!(result.issues.iter().any(|i| i.contains("Invalid relative import .gone")));
        // stdlib call is ignored
        assert!(!result.issues.iter().any(|i| i.contains("getcwd")));
        assert_eq!(result.function_calls.len(), 2);
    }

    #[test]
    fn test_imported_function_resolved_by_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        let lib = write(dir.path(), "lib.py", "def greet(name: str) -> str:\n    return name\n");
        let app = write(
            dir.path(),
            "app.py",
            "from lib import greet\n\ndef main() -> None:\n    greet(5)\n",
        );
        let result = check_python_project(&[lib, app]);
        assert_eq!(result.function_calls.len(), 1);
        assert_eq!(result.function_calls[0].matched_function, "lib.greet");
        assert!(!result.function_calls[0].valid);
    }
}
