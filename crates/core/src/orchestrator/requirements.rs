//! Third-party import roots of a generated Python project, written out as
//! `requirements.txt`.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::validation::python::{extract_imports, is_standard_library};

pub const REQUIREMENTS_FILE: &str = "requirements.txt";

fn python_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "py"))
        .map(|e| e.into_path())
        .collect()
}

/// Sorted import roots that are neither relative, standard library, nor a
/// module of the project itself
pub fn collect_requirements(root: &Path) -> BTreeSet<String> {
    let files = python_files(root);
    let local: HashSet<String> = files
        .iter()
        .flat_map(|p| {
            let stem = p.file_stem().map(|s| s.to_string_lossy().to_string());
            let package = p
                .parent()
                .filter(|dir| dir.join("__init__.py").exists())
                .and_then(|dir| dir.file_name())
                .map(|s| s.to_string_lossy().to_string());
            stem.into_iter().chain(package)
        })
        .collect();

    let mut roots = BTreeSet::new();
    for path in &files {
        let Ok(content) = std::fs::read_to_string(path) else {
            tracing::warn!(path = %path.display(), "Skipping unreadable Python file");
            continue;
        };
        for import in extract_imports(&content) {
            if import.starts_with('.') || is_standard_library(&import) {
                continue;
            }
            let root_name = import.split('.').next().unwrap_or(&import).to_string();
            if !local.contains(&root_name) {
                roots.insert(root_name);
            }
        }
    }
    roots
}

/// Write `requirements.txt` under `root`; `None` when nothing third-party
/// is imported
pub fn write_requirements(root: &Path) -> Result<Option<PathBuf>> {
    let roots = collect_requirements(root);
    if roots.is_empty() {
        return Ok(None);
    }
    let path = root.join(REQUIREMENTS_FILE);
    let body: String = roots.iter().map(|r| format!("{}\n", r)).collect();
    std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(count = roots.len(), "Wrote {}", REQUIREMENTS_FILE);
    Ok(Some(path))
}
