//! # Run Events
//!
//! Progress events emitted while a run advances, for streaming to a UI or
//! log sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of run event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted,
    /// Planner finished (data: file count)
    PlanReady,
    /// Content written for the first time
    FileGenerated,
    /// Structural validation finished
    FileValidated,
    FileEvaluated,
    FixAttempt,
    /// Score reached the target
    FileAccepted,
    /// Attempts exhausted, best version persisted
    FileBestKept,
    FileFailed,
    RunCompleted,
}

/// An event in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: RunEventKind,
    /// Agent that produced this event
    pub agent: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Output-relative path when the event concerns one file
    #[serde(default)]
    pub file: Option<String>,
}

impl RunEvent {
    pub fn new(kind: RunEventKind, agent: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            agent: agent.to_string(),
            data: None,
            file: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.file = Some(path.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = RunEvent::new(RunEventKind::FixAttempt, "codegen")
            .with_file("js/main.js")
            .with_data(serde_json::json!({"attempt": 2}));

        assert_eq!(event.agent, "codegen");
        assert_eq!(event.file.as_deref(), Some("js/main.js"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "fix_attempt");
    }
}
