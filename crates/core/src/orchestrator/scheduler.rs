//! # Scheduler
//!
//! Turns a plan into a FIFO queue of task items. Files inside an item are
//! ordered by role so data and logic exist before the files that reference
//! them. An item whose dependencies have not completed goes back to the
//! end of the queue.

use std::collections::{HashSet, VecDeque};

use crate::agents::{FileSpec, Plan, CODEGEN_ID};

/// Stable sort by role priority; equal roles keep plan order
pub fn sort_files_by_dependency(files: &[FileSpec]) -> Vec<FileSpec> {
    let mut sorted = files.to_vec();
    sorted.sort_by_key(|f| f.role.priority());
    sorted
}

/// One plan task scheduled for generation
#[derive(Debug, Clone)]
pub struct TaskItem {
    pub task_id: String,
    pub description: String,
    /// Role-sorted
    pub files: Vec<FileSpec>,
    /// Task ids that must complete first
    pub dependencies: Vec<String>,
    pub agent: String,
}

impl TaskItem {
    pub fn is_ready(&self, completed: &HashSet<String>) -> bool {
        self.dependencies.iter().all(|d| completed.contains(d))
    }
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    items: VecDeque<TaskItem>,
}

impl TaskQueue {
    /// `task_1`, `task_2`, ... in plan order
    pub fn from_plan(plan: &Plan) -> Self {
        let items = plan
            .task_list
            .iter()
            .enumerate()
            .map(|(i, task)| TaskItem {
                task_id: format!("task_{}", i + 1),
                description: task.task.clone(),
                files: sort_files_by_dependency(&task.files),
                dependencies: Vec::new(),
                agent: CODEGEN_ID.to_string(),
            })
            .collect();
        Self { items }
    }

    pub fn push(&mut self, item: TaskItem) {
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Next ready item, rotating blocked items to the back
    ///
    /// Returns `None` when the queue is empty or when a full pass finds
    /// nothing ready; blocked items stay queued.
    pub fn next_ready(&mut self, completed: &HashSet<String>) -> Option<TaskItem> {
        for _ in 0..self.items.len() {
            let item = self.items.pop_front()?;
            if item.is_ready(completed) {
                return Some(item);
            }
            tracing::debug!("Task {} waiting on {:?}", item.task_id, item.dependencies);
            self.items.push_back(item);
        }
        None
    }

    /// Remove whatever is left, for reporting
    pub fn drain(&mut self) -> Vec<TaskItem> {
        self.items.drain(..).collect()
    }
}
