//! # Code Knowledge Base
//!
//! Running index of what has been generated so far: Python functions and
//! classes keyed as `module.name`, web files with their references and
//! elements, and a directory hierarchy. The generator asks it for import
//! suggestions and path conventions so later files line up with earlier
//! ones.
//!
//! ## Update discipline
//!
//! Registering a file replaces that file's previous entries and leaves
//! everything else alone. The orchestrator owns one instance per run and
//! writes to it from a single task at a time.

mod python;
mod web;

pub use python::Strategy;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::validation::python::extract_imports;
use crate::validation::references::relative_path;

/// Conventional folders per asset type
const PATH_PATTERNS: &[(&str, &[&str])] = &[
    ("css", &["css/", "styles/", "assets/css/"]),
    ("js", &["js/", "scripts/", "assets/js/"]),
    ("images", &["images/", "assets/images/", "img/"]),
    ("data", &["data/", "assets/data/"]),
];

const MAX_PATH_SUGGESTIONS: usize = 5;
const MAX_CONTEXT_FUNCTIONS: usize = 5;
const MAX_CONTEXT_CLASSES: usize = 3;
const MAX_FILES_PER_DIR: usize = 5;

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub parameters: Vec<String>,
    pub return_type: Option<String>,
    pub is_async: bool,
    pub file_path: String,
    pub line_number: usize,
    pub docstring: Option<String>,
}

impl FunctionInfo {
    /// `name(a, b) -> T`
    pub fn signature(&self) -> String {
        let mut sig = format!("{}({})", self.name, self.parameters.join(", "));
        if let Some(ret) = &self.return_type {
            sig.push_str(" -> ");
            sig.push_str(ret);
        }
        sig
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub methods: Vec<FunctionInfo>,
    pub base_classes: Vec<String>,
    pub file_path: String,
    pub line_number: usize,
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WebFileInfo {
    pub file_path: String,
    pub file_type: String,
    pub references: Vec<String>,
    pub elements: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleInfo {
    pub name: String,
    pub file_path: String,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub imports: Vec<String>,
}

// ============================================================================
// Knowledge Base
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Paths under this root are recorded relative to it
    #[serde(skip)]
    root: Option<PathBuf>,
    modules: BTreeMap<String, ModuleInfo>,
    functions: BTreeMap<String, FunctionInfo>,
    classes: BTreeMap<String, ClassInfo>,
    web_files: BTreeMap<String, WebFileInfo>,
    hierarchy: BTreeMap<String, Vec<String>>,
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn patterns_for(file_type: &str) -> &'static [&'static str] {
    let key = match file_type {
        "json" => "data",
        "png" | "jpg" | "jpeg" | "gif" | "svg" => "images",
        other => other,
    };
    PATH_PATTERNS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, p)| *p)
        .unwrap_or(&[])
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn key(&self, path: &Path) -> String {
        let shown = match &self.root {
            Some(root) => path.strip_prefix(root).unwrap_or(path),
            None => path,
        };
        shown.to_string_lossy().replace('\\', "/")
    }

    fn remove_module(&mut self, name: &str) {
        let prefix = format!("{}.", name);
        self.modules.remove(name);
        self.functions.retain(|k, _| !k.starts_with(&prefix));
        self.classes.retain(|k, _| !k.starts_with(&prefix));
    }

    /// Index a Python module, replacing whatever was known about it
    pub fn add_module(&mut self, path: &Path, content: &str) -> Strategy {
        let name = module_name(path);
        let file_path = self.key(path);
        self.remove_module(&name);

        let extraction = python::extract(content, &file_path);
        let mut module = ModuleInfo {
            name: name.clone(),
            file_path,
            imports: extract_imports(content)
                .into_iter()
                .filter(|i| !i.starts_with('.'))
                .collect(),
            ..ModuleInfo::default()
        };

        for func in extraction.functions {
            module.functions.push(func.name.clone());
            self.functions.insert(format!("{}.{}", name, func.name), func);
        }
        for class in extraction.classes {
            for method in &class.methods {
                self.functions
                    .insert(format!("{}.{}.{}", name, class.name, method.name), method.clone());
            }
            module.classes.push(class.name.clone());
            self.classes.insert(format!("{}.{}", name, class.name), class);
        }

        tracing::debug!(
            module = %name,
            functions = module.functions.len(),
            classes = module.classes.len(),
            strategy = ?extraction.strategy,
            "Indexed Python module"
        );
        self.modules.insert(name, module);
        extraction.strategy
    }

    /// Index an HTML, CSS, JS or other web asset
    pub fn add_web_file(&mut self, path: &Path, content: &str) {
        let key = self.key(path);
        let file_type = extension(path);
        let info = match file_type.as_str() {
            "html" | "htm" => web::html(&key, content),
            "css" => web::css(&key, content),
            "js" => web::js(&key, content),
            other => web::basic(&key, other),
        };

        let dir = Path::new(&key)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let files = self.hierarchy.entry(dir).or_default();
        if !files.contains(&key) {
            files.push(key.clone());
        }
        self.web_files.insert(key, info);
    }

    /// Dispatch on extension; returns false for types the base ignores
    pub fn register(&mut self, path: &Path, content: &str) -> bool {
        match extension(path).as_str() {
            "py" => {
                self.add_module(path, content);
                true
            }
            "html" | "htm" | "css" | "js" | "json" => {
                self.add_web_file(path, content);
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    pub fn module(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.get(name)
    }

    pub fn web_file(&self, path: &Path) -> Option<&WebFileInfo> {
        self.web_files.get(&self.key(path))
    }

    /// Qualified key (`module.name`) or bare name
    pub fn find_function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name).or_else(|| {
            self.functions
                .iter()
                .find(|(k, f)| f.name == name && k.matches('.').count() == 1)
                .map(|(_, f)| f)
        })
    }

    pub fn find_class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes
            .get(name)
            .or_else(|| self.classes.values().find(|c| c.name == name))
    }

    fn defining_module(&self, qualified: Option<&String>) -> Option<String> {
        qualified.and_then(|k| k.split('.').next()).map(String::from)
    }

    /// Every indexed function, optionally limited to one module
    pub fn available_functions(&self, module: Option<&str>) -> Vec<(&str, &FunctionInfo)> {
        let prefix = module.map(|m| format!("{}.", m));
        self.functions
            .iter()
            .filter(|(k, _)| prefix.as_ref().map_or(true, |p| k.starts_with(p)))
            .map(|(k, f)| (k.as_str(), f))
            .collect()
    }

    pub fn available_classes(&self, module: Option<&str>) -> Vec<(&str, &ClassInfo)> {
        let prefix = module.map(|m| format!("{}.", m));
        self.classes
            .iter()
            .filter(|(k, _)| prefix.as_ref().map_or(true, |p| k.starts_with(p)))
            .map(|(k, c)| (k.as_str(), c))
            .collect()
    }

    /// `from X import Y` lines for symbols defined outside `target_module`
    pub fn suggest_imports(
        &self,
        target_module: &str,
        functions: &[&str],
        classes: &[&str],
    ) -> Vec<String> {
        let mut suggestions = Vec::new();
        for name in functions {
            let key = self
                .functions
                .keys()
                .find(|k| k.as_str() == *name || (k.ends_with(&format!(".{}", name)) && k.matches('.').count() == 1));
            if let Some(module) = self.defining_module(key) {
                let short = name.rsplit('.').next().unwrap_or(name);
                if module != target_module {
                    suggestions.push(format!("from {} import {}", module, short));
                }
            }
        }
        for name in classes {
            let key = self
                .classes
                .iter()
                .find(|(k, c)| k.as_str() == *name || c.name == *name)
                .map(|(k, _)| k);
            if let Some(module) = self.defining_module(key) {
                let short = name.rsplit('.').next().unwrap_or(name);
                if module != target_module {
                    suggestions.push(format!("from {} import {}", module, short));
                }
            }
        }
        suggestions
    }

    // ------------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------------

    /// Relative paths from `target_file` to known files of `file_type`,
    /// else conventional folders; shortest first
    pub fn suggest_web_file_paths(&self, target_file: &Path, file_type: &str) -> Vec<String> {
        let target = self.key(target_file);
        let target_dir = Path::new(&target).parent().unwrap_or(Path::new(""));

        let mut suggestions: Vec<String> = self
            .web_files
            .values()
            .filter(|w| w.file_type == file_type && w.file_path != target)
            .map(|w| {
                relative_path(Path::new(&w.file_path), target_dir)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();

        if suggestions.is_empty() {
            suggestions = patterns_for(file_type)
                .iter()
                .map(|p| format!("{}file.{}", p, file_type))
                .collect();
        }

        suggestions.sort_by_key(|s| s.len());
        suggestions.dedup();
        suggestions.truncate(MAX_PATH_SUGGESTIONS);
        suggestions
    }

    // ------------------------------------------------------------------------
    // Prompt context
    // ------------------------------------------------------------------------

    /// Reusable functions and classes from modules other than `target_file`'s
    pub fn generate_import_context(&self, target_file: &Path) -> String {
        let target = module_name(target_file);
        let foreign = |key: &str| key.split('.').next() != Some(target.as_str());

        let functions: Vec<String> = self
            .functions
            .iter()
            .filter(|(k, _)| k.matches('.').count() == 1 && foreign(k))
            .take(MAX_CONTEXT_FUNCTIONS)
            .map(|(k, f)| {
                let module = k.split('.').next().unwrap_or_default();
                format!("  - {}.{}", module, f.signature())
            })
            .collect();
        let classes: Vec<String> = self
            .classes
            .iter()
            .filter(|(k, _)| foreign(k))
            .take(MAX_CONTEXT_CLASSES)
            .map(|(k, c)| {
                if c.base_classes.is_empty() {
                    format!("  - {}", k)
                } else {
                    format!("  - {}({})", k, c.base_classes.join(", "))
                }
            })
            .collect();

        let mut sections = Vec::new();
        if !functions.is_empty() {
            sections.push(format!(
                "Available functions from other modules:\n{}",
                functions.join("\n")
            ));
        }
        if !classes.is_empty() {
            sections.push(format!(
                "Available classes from other modules:\n{}",
                classes.join("\n")
            ));
        }
        sections.join("\n\n")
    }

    /// File type counts, directory listing and path conventions
    pub fn project_structure_summary(&self) -> String {
        if self.web_files.is_empty() {
            return String::new();
        }

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for info in self.web_files.values() {
            *counts.entry(info.file_type.as_str()).or_default() += 1;
        }

        let mut lines = vec!["Project structure summary:".to_string()];
        lines.push(format!(
            "File types: {}",
            counts
                .iter()
                .map(|(t, n)| format!("{}: {}", t, n))
                .collect::<Vec<_>>()
                .join(", ")
        ));

        lines.push("Directories:".to_string());
        for (dir, files) in &self.hierarchy {
            lines.push(format!("  {}/", dir));
            for file in files.iter().take(MAX_FILES_PER_DIR) {
                let name = Path::new(file)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| file.clone());
                lines.push(format!("    - {}", name));
            }
            if files.len() > MAX_FILES_PER_DIR {
                lines.push(format!(
                    "    - ... and {} more files",
                    files.len() - MAX_FILES_PER_DIR
                ));
            }
        }

        lines.push("Path patterns:".to_string());
        for (kind, patterns) in PATH_PATTERNS {
            lines.push(format!("  {} files: {}", kind, patterns.join(", ")));
        }
        lines.join("\n")
    }

    /// Structure summary plus reference suggestions for HTML, CSS and JS targets
    pub fn generate_web_file_context(&self, target_file: &Path) -> String {
        let file_type = extension(target_file);
        if !matches!(file_type.as_str(), "html" | "htm" | "css" | "js") {
            return String::new();
        }

        let mut sections = Vec::new();
        let summary = self.project_structure_summary();
        if !summary.is_empty() {
            sections.push(summary);
        }

        match file_type.as_str() {
            "html" | "htm" => sections.push(format!(
                "HTML reference suggestions:\n  CSS paths: {}\n  JS paths: {}",
                self.suggest_web_file_paths(target_file, "css").join(", "),
                self.suggest_web_file_paths(target_file, "js").join(", ")
            )),
            "js" => sections.push(format!(
                "Data file suggestions:\n  JSON paths: {}",
                self.suggest_web_file_paths(target_file, "json").join(", ")
            )),
            _ => {}
        }
        sections.join("\n\n")
    }

    // ------------------------------------------------------------------------
    // Bulk operations
    // ------------------------------------------------------------------------

    /// Register every Python and web file under `base`; returns how many
    pub fn scan_directory(&mut self, base: &Path) -> Result<usize> {
        let mut registered = 0;
        let walker = WalkDir::new(base).into_iter().filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || !(name.starts_with('.') || name == "__pycache__")
        });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => {
                    if self.register(entry.path(), &content) {
                        registered += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable file");
                }
            }
        }
        Ok(registered)
    }

    pub fn clear(&mut self) {
        self.modules.clear();
        self.functions.clear();
        self.classes.clear();
        self.web_files.clear();
        self.hierarchy.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reregistration_replaces_module_symbols() {
        let mut kb = KnowledgeBase::new();
        let path = Path::new("utils.py");
        kb.add_module(path, "def old_helper(x):\n    return x\n\nclass Legacy:\n    def run(self):\n        pass\n");
        kb.add_module(path, "def new_helper(y) -> int:\n    return y\n");

        let keys: Vec<&str> = kb.available_functions(Some("utils")).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["utils.new_helper"]);
        assert!(kb.available_classes(Some("utils")).is_empty());
        assert_eq!(kb.module("utils").map(|m| m.functions.clone()), Some(vec!["new_helper".to_string()]));
    }

    #[test]
    fn test_reregistration_keeps_other_modules() {
        let mut kb = KnowledgeBase::new();
        kb.add_module(Path::new("a.py"), "def alpha():\n    pass\n");
        kb.add_module(Path::new("b.py"), "def beta():\n    pass\n");
        kb.add_module(Path::new("a.py"), "def gamma():\n    pass\n");

        assert!(kb.find_function("b.beta").is_some());
        assert!(kb.find_function("alpha").is_none());
        assert_eq!(kb.find_function("gamma").map(|f| f.name.as_str()), Some("gamma"));
    }

    #[test]
    fn test_methods_indexed_under_class() {
        let mut kb = KnowledgeBase::new();
        kb.add_module(Path::new("models.py"), "class User(Base):\n    def save(self) -> None:\n        pass\n");
        assert!(kb.find_function("models.User.save").is_some());
        assert_eq!(kb.find_class("User").map(|c| c.base_classes.clone()), Some(vec!["Base".to_string()]));
    }

    #[test]
    fn test_suggest_imports_skips_same_module() {
        let mut kb = KnowledgeBase::new();
        kb.add_module(Path::new("helpers.py"), "def slugify(text: str) -> str:\n    return text\n\nclass Cache:\n    pass\n");

        assert_eq!(
            kb.suggest_imports("main", &["slugify"], &["Cache"]),
            vec!["from helpers import slugify", "from helpers import Cache"]
        );
        assert!(kb.suggest_imports("helpers", &["slugify"], &[]).is_empty());
        assert!(kb.suggest_imports("main", &["missing"], &[]).is_empty());
    }

    #[test]
    fn test_import_context_excludes_target() {
        let mut kb = KnowledgeBase::new();
        assert_eq!(kb.generate_import_context(Path::new("main.py")), "");

        kb.add_module(Path::new("helpers.py"), "def slugify(text: str) -> str:\n    return text\n");
        kb.add_module(Path::new("main.py"), "def main():\n    pass\n");

        let context = kb.generate_import_context(Path::new("main.py"));
        assert!(context.contains("helpers.slugify(text) -> str"));
        assert!(!context.contains("main.main"));
    }

    #[test]
    fn test_web_path_suggestions() {
        let mut kb = KnowledgeBase::new().with_root("/out");
        assert_eq!(
            kb.suggest_web_file_paths(Path::new("/out/index.html"), "css"),
            vec!["css/file.css", "styles/file.css", "assets/css/file.css"]
        );

        kb.add_web_file(Path::new("/out/css/style.css"), "body { margin: 0 }");
        kb.add_web_file(Path::new("/out/pages/about.html"), "<html><body></body></html>");
        assert_eq!(
            kb.suggest_web_file_paths(Path::new("/out/index.html"), "css"),
            vec!["css/style.css"]
        );
        assert_eq!(
            kb.suggest_web_file_paths(Path::new("/out/pages/about.html"), "css"),
            vec!["../css/style.css"]
        );
    }

    #[test]
    fn test_structure_summary_and_web_context() {
        let mut kb = KnowledgeBase::new().with_root("/out");
        assert_eq!(kb.project_structure_summary(), "");
        assert_eq!(kb.generate_web_file_context(Path::new("/out/data/items.json")), "");

        kb.add_web_file(Path::new("/out/css/style.css"), "body { margin: 0 }");
        kb.add_web_file(Path::new("/out/js/main.js"), "fetch('data/items.json')");

        let summary = kb.project_structure_summary();
        assert!(summary.contains("File types: css: 1, js: 1"));
        assert!(summary.contains("  css/\n    - style.css"));

        let context = kb.generate_web_file_context(Path::new("/out/index.html"));
        assert!(context.contains("CSS paths: css/style.css"));
        assert!(context.contains("JS paths: js/main.js"));
    }

    #[test]
    fn test_scan_directory_skips_hidden_and_cache() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "def run():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("index.html"), "<html><body></body></html>").unwrap();
        std::fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        std::fs::write(dir.path().join("__pycache__/cached.py"), "def cached():\n    pass\n").unwrap();
        std::fs::write(dir.path().join(".hidden.py"), "def secret():\n    pass\n").unwrap();

        let mut kb = KnowledgeBase::new().with_root(dir.path());
        assert_eq!(kb.scan_directory(dir.path()).unwrap(), 2);
        assert!(kb.find_function("app.run").is_some());
        assert!(kb.find_function("secret").is_none());

        kb.clear();
        assert!(kb.find_function("app.run").is_none());
        assert_eq!(kb.project_structure_summary(), "");
    }
}
