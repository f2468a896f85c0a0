//! # Collaborator Tools
//!
//! Side-effecting collaborators the core drives but never reimplements.
//!
//! ## Modules
//!
//! - `filesystem` - Output tree access rooted at one base directory
//! - `executor` - Subprocess execution, `node --check`, package probing
//! - `search` - Brave web search with cache, throttle and fallback

pub mod executor;
pub mod filesystem;
pub mod search;

pub use executor::{CodeRunner, ExecutionResult, PackageProbe, ProcessRunner, PythonProbe};
pub use filesystem::{FileStore, LocalFileStore};
pub use search::{BraveSearch, OfflineSearch, SearchResult, WebSearch};
