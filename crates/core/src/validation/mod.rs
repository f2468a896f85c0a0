//! # Validation Engine
//!
//! Format-specific structural checks for generated artifacts plus the
//! cross-file consistency and reference sweeps that tie a web project
//! together.
//!
//! ## Contract
//!
//! Validators never return `Err` for malformed input. A broken file, a
//! missing file or an unreadable file all degrade to a report with
//! `valid == false` and a descriptive error.
//!
//! ## Modules
//!
//! - `html`, `css`, `js`, `json`, `python` - per-format validators
//! - `cross_file` - HTML ids vs JS lookups, JSON accessors, Python call arity
//! - `references` - reference resolution, project root, JS load order

pub mod cross_file;
pub mod css;
pub mod html;
pub mod js;
pub mod json;
pub mod python;
pub mod references;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::tools::executor::{PackageProbe, PythonProbe};

pub use cross_file::{CrossFileReport, PythonCrossFileReport};
pub use references::ReferenceReport;

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one structural check
///
/// Errors block acceptance; warnings are advisory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    /// Report for a file that could not be read
    pub fn unreadable(path: &Path, err: impl std::fmt::Display) -> Self {
        Self {
            valid: false,
            errors: vec![format!("Failed to read file {}: {}", path.display(), err)],
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.valid = false;
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another report in, keeping its messages prefixed
    pub fn absorb(&mut self, prefix: &str, other: &ValidationReport) {
        for e in &other.errors {
            self.error(format!("{}{}", prefix, e));
        }
        for w in &other.warnings {
            self.warn(format!("{}{}", prefix, w));
        }
    }
}

/// File formats the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Html,
    Css,
    Js,
    Json,
    Python,
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("html") | Some("htm") => FileKind::Html,
            Some("css") => FileKind::Css,
            Some("js") => FileKind::Js,
            Some("json") => FileKind::Json,
            Some("py") => FileKind::Python,
            _ => FileKind::Other,
        }
    }

    /// HTML, CSS, JS or JSON
    pub fn is_web(&self) -> bool {
        matches!(
            self,
            FileKind::Html | FileKind::Css | FileKind::Js | FileKind::Json
        )
    }
}

/// Batch result for a set of web files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebValidation {
    /// Per-file structural reports keyed by path
    pub files: BTreeMap<String, ValidationReport>,
    /// Present when at least one HTML and one JS file were supplied
    pub cross_file: Option<CrossFileReport>,
    /// Reference sweep per HTML/JS file
    pub references: BTreeMap<String, ReferenceReport>,
}

impl WebValidation {
    /// Errors that originate in `path`: its own validator plus its
    /// reference sweep
    pub fn errors_for(&self, path: &Path) -> Vec<String> {
        let key = path.to_string_lossy();
        let mut errors = Vec::new();
        if let Some(report) = self.files.get(key.as_ref()) {
            errors.extend(report.errors.iter().cloned());
        }
        if let Some(refs) = self.references.get(key.as_ref()) {
            errors.extend(refs.errors.iter().cloned());
        }
        errors
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Entry point used by the evaluator and the orchestrator
#[derive(Clone)]
pub struct ValidationEngine {
    probe: Arc<dyn PackageProbe>,
    js_syntax_check: bool,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(Arc::new(PythonProbe::default()))
    }
}

impl ValidationEngine {
    pub fn new(probe: Arc<dyn PackageProbe>) -> Self {
        Self {
            probe,
            js_syntax_check: true,
        }
    }

    /// Toggle the external `node --check` pass
    pub fn with_js_syntax_check(mut self, enabled: bool) -> Self {
        self.js_syntax_check = enabled;
        self
    }

    pub fn probe(&self) -> &dyn PackageProbe {
        self.probe.as_ref()
    }

    /// Structural check dispatched on the file extension
    pub fn validate_file(&self, path: &Path) -> ValidationReport {
        match FileKind::from_path(path) {
            FileKind::Html => html::validate_file(path, true).report,
            FileKind::Css => css::validate_file(path).report,
            FileKind::Js => js::validate_file(path, None, self.js_syntax_check).report,
            FileKind::Json => json::validate_file(path).report,
            FileKind::Python => python::validate_file(path, self.probe()).report,
            FileKind::Other => ValidationReport::new(),
        }
    }

    /// Python report with the categorized issue lists
    pub fn validate_python(&self, path: &Path) -> python::PythonReport {
        python::validate_file(path, self.probe())
    }

    /// Batch-validate web files: per-format checks, a cross-file
    /// consistency pass when HTML and JS are both present, and a
    /// reference sweep across every supplied path
    pub fn validate_web_files(&self, paths: &[PathBuf]) -> WebValidation {
        let mut result = WebValidation::default();

        for path in paths {
            let kind = FileKind::from_path(path);
            if !kind.is_web() {
                continue;
            }
            let report = match kind {
                FileKind::Html => html::validate_file(path, false).report,
                FileKind::Css => css::validate_file(path).report,
                FileKind::Js => js::validate_file(path, None, self.js_syntax_check).report,
                _ => json::validate_file(path).report,
            };
            result
                .files
                .insert(path.to_string_lossy().to_string(), report);
        }

        let first = |kind: FileKind| paths.iter().find(|p| FileKind::from_path(p) == kind);
        if let (Some(html_path), Some(js_path)) = (first(FileKind::Html), first(FileKind::Js)) {
            result.cross_file = Some(cross_file::check_web_consistency(
                html_path,
                js_path,
                first(FileKind::Json).map(PathBuf::as_path),
                self.js_syntax_check,
            ));
        }

        for path in paths {
            if matches!(FileKind::from_path(path), FileKind::Html | FileKind::Js) {
                result.references.insert(
                    path.to_string_lossy().to_string(),
                    references::check_references(path, paths),
                );
            }
        }

        result
    }

    /// Cross-module call and import checks across Python files
    pub fn validate_python_project(&self, paths: &[PathBuf]) -> PythonCrossFileReport {
        cross_file::check_python_project(paths)
    }
}

/// Read a file, mapping failure into a report
pub(crate) fn read_source(path: &Path) -> Result<String, ValidationReport> {
    std::fs::read_to_string(path).map_err(|e| ValidationReport::unreadable(path, e))
}
