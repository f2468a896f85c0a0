//! # Run Memory
//!
//! Everything a run records about itself: task history, agent
//! communications, errors, per-agent timings, decisions and the version
//! log of every written file. Owned by one orchestrator and mutated only
//! through the methods below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::protocol::ProtocolMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Planning,
    Execution,
    Completion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectState {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub overall_status: OverallStatus,
    pub progress_percentage: f64,
    /// Seconds, extrapolated from elapsed time
    pub estimated_remaining_time: Option<f64>,
    pub current_phase: Phase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub agent: String,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub task_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Call count and running mean latency of one agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub calls: u32,
    /// Seconds
    pub avg_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunQuality {
    /// Percent of task history entries that failed
    pub error_rate: f64,
    pub success_rate: f64,
    pub code_quality_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub agents: BTreeMap<String, AgentMetrics>,
    pub tasks_per_minute: f64,
    pub quality: RunQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry in a file's append-only version log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    /// 1-based, monotonic per path
    pub version_id: usize,
    /// Hex SHA-256 of the content
    pub content_hash: String,
    /// `create`, `fix_attempt_<n>` or `final_best`
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub file_path: String,
    pub version_id: usize,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionControl {
    pub file_versions: BTreeMap<String, Vec<FileVersion>>,
    pub change_history: Vec<ChangeRecord>,
}

/// Compact progress view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub overall_status: OverallStatus,
    pub progress: f64,
    pub current_phase: Phase,
    pub tasks_completed: usize,
    pub total_tasks: usize,
    pub errors_count: usize,
    pub communications_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationSummary {
    pub total: usize,
    /// Keyed `<from>_to_<to>`
    pub by_agent: BTreeMap<String, usize>,
}

/// Exported view of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub timestamp: DateTime<Utc>,
    pub project_state: ProjectState,
    pub performance_metrics: PerformanceMetrics,
    pub task_summary: TaskSummary,
    pub communication_summary: CommunicationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMemory {
    pub project_state: ProjectState,
    pub task_history: Vec<TaskRecord>,
    pub agent_communications: Vec<ProtocolMessage>,
    pub error_logs: Vec<ErrorRecord>,
    pub performance_metrics: PerformanceMetrics,
    pub decision_log: Vec<Decision>,
    pub version_control: VersionControl,
}

impl RunMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.project_state.start_time = Some(Utc::now());
        self.project_state.current_phase = Phase::Planning;
        self.project_state.overall_status = OverallStatus::InProgress;
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.project_state.current_phase = phase;
        self.decide(format!("Phase changed to {:?}", phase));
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    pub fn log_task(
        &mut self,
        task_id: &str,
        agent: &str,
        status: TaskStatus,
        result: Option<serde_json::Value>,
    ) {
        self.task_history.push(TaskRecord {
            task_id: task_id.to_string(),
            agent: agent.to_string(),
            status,
            timestamp: Utc::now(),
            result,
        });
    }

    pub fn log_error(&mut self, task_id: &str, error: impl Into<String>) {
        let error = error.into();
        tracing::warn!("[{}] {}", task_id, error);
        self.error_logs.push(ErrorRecord {
            task_id: task_id.to_string(),
            error,
            timestamp: Utc::now(),
        });
    }

    pub fn log_communication(&mut self, message: ProtocolMessage) {
        tracing::debug!(
            "{} -> {}: {}",
            message.from,
            message.to,
            message.message_type()
        );
        self.agent_communications.push(message);
    }

    pub fn decide(&mut self, message: impl Into<String>) {
        self.decision_log.push(Decision {
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Fold one call's duration into the agent's running mean
    pub fn record_agent_call(&mut self, agent: &str, seconds: f64) {
        let metrics = self
            .performance_metrics
            .agents
            .entry(agent.to_string())
            .or_default();
        metrics.calls += 1;
        metrics.avg_time += (seconds - metrics.avg_time) / f64::from(metrics.calls);
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.task_history.iter().filter(|t| t.status == status).count()
    }

    /// Recompute progress and the remaining-time estimate
    pub fn update_progress(&mut self) {
        let total = self.task_history.len();
        if total == 0 {
            return;
        }
        let progress = self.count(TaskStatus::Completed) as f64 / total as f64 * 100.0;
        self.project_state.progress_percentage = progress;

        if let Some(start) = self.project_state.start_time {
            let elapsed = elapsed_secs(start);
            self.project_state.estimated_remaining_time = (progress > 0.0)
                .then(|| (elapsed / (progress / 100.0) - elapsed).max(0.0));
        }
    }

    /// Recompute error, success and quality rates from the history
    pub fn update_error_metrics(&mut self) {
        let total = self.task_history.len();
        if total == 0 {
            return;
        }
        let error_rate = self.count(TaskStatus::Failed) as f64 / total as f64 * 100.0;
        self.performance_metrics.quality = RunQuality {
            error_rate,
            success_rate: 100.0 - error_rate,
            code_quality_score: (100.0 - error_rate * 2.0).max(0.0),
        };
    }

    pub fn update_throughput(&mut self) {
        let Some(start) = self.project_state.start_time else {
            return;
        };
        let minutes = elapsed_secs(start) / 60.0;
        if minutes > 0.0 {
            self.performance_metrics.tasks_per_minute = self.task_history.len() as f64 / minutes;
        }
    }

    /// Status from the history: any failure fails the run, all completed
    /// completes it, anything else stays in progress
    pub fn determine_completion(&mut self) -> OverallStatus {
        let status = if self.task_history.iter().any(|t| t.status == TaskStatus::Failed) {
            OverallStatus::Failed
        } else if !self.task_history.is_empty()
            && self.task_history.iter().all(|t| t.status == TaskStatus::Completed)
        {
            OverallStatus::Completed
        } else {
            OverallStatus::InProgress
        };
        self.project_state.overall_status = status;
        status
    }

    /// Close the run: completion phase, end time, final metrics
    pub fn finish(&mut self) -> OverallStatus {
        self.project_state.end_time = Some(Utc::now());
        self.set_phase(Phase::Completion);
        self.update_throughput();
        self.update_error_metrics();
        self.update_progress();
        self.determine_completion()
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Append a version of `path` and return its id
    pub fn record_version(&mut self, path: &str, content: &str, operation: &str) -> usize {
        let versions = self
            .version_control
            .file_versions
            .entry(path.to_string())
            .or_default();
        let version_id = versions.len() + 1;
        let timestamp = Utc::now();
        versions.push(FileVersion {
            version_id,
            content_hash: content_hash(content),
            operation: operation.to_string(),
            timestamp,
            size_bytes: content.len(),
        });
        self.version_control.change_history.push(ChangeRecord {
            file_path: path.to_string(),
            version_id,
            operation: operation.to_string(),
            timestamp,
        });
        version_id
    }

    pub fn versions(&self, path: &str) -> &[FileVersion] {
        self.version_control
            .file_versions
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn status(&self) -> RunStatus {
        RunStatus {
            overall_status: self.project_state.overall_status,
            progress: self.project_state.progress_percentage,
            current_phase: self.project_state.current_phase,
            tasks_completed: self.count(TaskStatus::Completed),
            total_tasks: self.task_history.len(),
            errors_count: self.error_logs.len(),
            communications_count: self.agent_communications.len(),
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let mut by_agent = BTreeMap::new();
        for message in &self.agent_communications {
            *by_agent
                .entry(format!("{}_to_{}", message.from, message.to))
                .or_insert(0) += 1;
        }
        RunSnapshot {
            timestamp: Utc::now(),
            project_state: self.project_state.clone(),
            performance_metrics: self.performance_metrics.clone(),
            task_summary: TaskSummary {
                total: self.task_history.len(),
                completed: self.count(TaskStatus::Completed),
                failed: self.count(TaskStatus::Failed),
            },
            communication_summary: CommunicationSummary {
                total: self.agent_communications.len(),
                by_agent,
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn elapsed_secs(start: DateTime<Utc>) -> f64 {
    (Utc::now() - start).num_milliseconds().max(0) as f64 / 1000.0
}

pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
