//! # Orchestration
//!
//! Schedules planned files through the agents and tracks the run.
//!
//! ## Per-file flow
//!
//! ```text
//! Generator → write → structural validation → Evaluator ─┬─ score ≥ target → accepted
//!                                                          └─ fix loop (≤ 5) → accepted | best kept
//! ```

pub mod config;
pub mod events;
pub mod fix_loop;
pub mod memory;
pub mod protocol;
pub mod related;
pub mod requirements;
pub mod runner;
pub mod scheduler;

pub use config::{OrchestratorConfig, MAX_FIX_ATTEMPTS, TARGET_QUALITY_SCORE};
pub use events::{RunEvent, RunEventKind};
pub use fix_loop::{FileState, FixLoop};
pub use memory::{OverallStatus, RunMemory, RunSnapshot, RunStatus, TaskStatus};
pub use protocol::{ProtocolMessage, PROTOCOL_VERSION};
pub use related::{check_links, find_related_web_files, LinkReport, RelatedFiles};
pub use requirements::write_requirements;
pub use runner::{FileOutcome, Orchestrator, RunSummary};
pub use scheduler::{sort_files_by_dependency, TaskItem, TaskQueue};
