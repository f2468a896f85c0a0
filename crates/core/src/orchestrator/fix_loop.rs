//! # Fix Loop State Machine
//!
//! Per-file lifecycle from first write to a terminal state:
//!
//! ```text
//! Generated -> Validated -> Evaluated -> Accepted
//!                               |
//!                               v
//!                            Fixing -> (Accepted | BestKept)
//! ```
//!
//! The machine only tracks state, attempts and the best version seen. The
//! orchestrator performs the I/O and feeds the outcomes back in.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Generated,
    Validated,
    Evaluated,
    Fixing,
    Accepted,
    /// Attempts exhausted; the best version is the final artifact
    BestKept,
    Failed,
}

impl FileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileState::Accepted | FileState::BestKept | FileState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct FixLoop {
    state: FileState,
    target: f64,
    max_attempts: u32,
    attempts: u32,
    original: String,
    current: String,
    best_content: String,
    best_score: f64,
    /// Best score after each evaluation, initial one included
    best_history: Vec<f64>,
    /// Next fix starts from the original content
    restart_from_original: bool,
}

impl FixLoop {
    pub fn new(content: &str, target: f64, max_attempts: u32) -> Self {
        Self {
            state: FileState::Generated,
            target,
            max_attempts,
            attempts: 0,
            original: content.to_string(),
            current: content.to_string(),
            best_content: content.to_string(),
            best_score: 0.0,
            best_history: Vec::new(),
            restart_from_original: false,
        }
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn best_content(&self) -> &str {
        &self.best_content
    }

    pub fn current_content(&self) -> &str {
        &self.current
    }

    pub fn best_history(&self) -> &[f64] {
        &self.best_history
    }

    /// True when the file on disk is not the best version
    pub fn needs_best_rewrite(&self) -> bool {
        self.current != self.best_content
    }

    pub fn validated(&mut self) {
        if self.state == FileState::Generated {
            self.state = FileState::Validated;
        }
    }

    /// Score of the freshly generated content
    pub fn evaluated(&mut self, score: f64) -> FileState {
        self.best_score = score;
        self.best_history.push(score);
        self.state = if score >= self.target {
            FileState::Accepted
        } else {
            FileState::Evaluated
        };
        self.state
    }

    /// Start the next attempt; `None` once the budget is spent
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.state.is_terminal() || self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.state = FileState::Fixing;
        Some(self.attempts)
    }

    /// Content the next fix should start from, and whether it is the
    /// original after an empty attempt
    pub fn fix_base(&self) -> (&str, bool) {
        if self.restart_from_original {
            (&self.original, true)
        } else {
            (&self.current, false)
        }
    }

    /// The fixer returned nothing; the next attempt restarts from the
    /// original content
    pub fn record_empty(&mut self) {
        self.restart_from_original = true;
    }

    /// Fixed content was written and scored
    pub fn record_attempt(&mut self, content: &str, score: f64) -> FileState {
        self.restart_from_original = false;
        self.current = content.to_string();
        if score > self.best_score {
            self.best_score = score;
            self.best_content = content.to_string();
        }
        self.best_history.push(self.best_score);
        if score >= self.target {
            self.state = FileState::Accepted;
        }
        self.state
    }

    /// Close a loop that never reached the target
    pub fn keep_best(&mut self) -> FileState {
        if !self.state.is_terminal() {
            self.state = FileState::BestKept;
            self.current = self.best_content.clone();
        }
        self.state
    }
}
