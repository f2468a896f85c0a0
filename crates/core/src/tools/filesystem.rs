//! # Filesystem Collaborator
//!
//! All generated artifacts live under one base directory owned by a
//! single orchestrator run.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Read/write access to the output tree
pub trait FileStore: Send + Sync {
    /// Absolute path for a plan-relative path, creating parent directories
    fn resolve(&self, relative: &str) -> Result<PathBuf>;
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    fn read(&self, path: &Path) -> Result<String>;
    fn base_dir(&self) -> &Path;
}

/// Local disk implementation
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    base_dir: PathBuf,
}

impl LocalFileStore {
    /// Open (and create) the base directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create output dir {}", base_dir.display()))?;
        Ok(Self { base_dir })
    }
}

/// Plan path reduced to normal components under the base dir
///
/// Root and prefix components are dropped so absolute paths become relative.
/// `..` may only cancel a component the path itself introduced.
fn contained_path(relative: &str) -> Result<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                if parts.pop().is_none() {
                    anyhow::bail!("Path {} escapes the output directory", relative);
                }
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if parts.is_empty() {
        anyhow::bail!("Path {:?} does not name a file", relative);
    }
    Ok(parts.iter().collect())
}

impl FileStore for LocalFileStore {
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let full = self.base_dir.join(contained_path(relative)?);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(full)
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("out")).unwrap();
        let path = store.resolve("css/style.css").unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(path.starts_with(store.base_dir()));
    }

    #[test]
    fn test_absolute_plan_path_stays_inside_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path()).unwrap();
        let path = store.resolve("/js/main.js").unwrap();
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn test_parent_components_cannot_leave_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("out")).unwrap();

        assert!(store.resolve("../escaped.txt").is_err());
        assert!(store.resolve("js/../../../etc/passwd").is_err());
        assert!(store.resolve("/../escaped.txt").is_err());
        assert!(store.resolve("..").is_err());
        assert!(!dir.path().join("escaped.txt").exists());

        let inside = store.resolve("js/../css/./style.css").unwrap();
        assert_eq!(inside, store.base_dir().join("css").join("style.css"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path()).unwrap();
        let path = store.resolve("main.py").unwrap();
        store.write(&path, "print('hi')\n").unwrap();
        assert_eq!(store.read(&path).unwrap(), "print('hi')\n");
        assert!(store.read(&dir.path().join("missing.txt")).is_err());
    }
}
