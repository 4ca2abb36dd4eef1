//! Task store boundary
//!
//! The Gantt chart owns the task records. The chat core reaches them only
//! through the [`TaskStore`] trait: read one task's fields, commit a field
//! set back (which triggers a host re-render), and take a snapshot of every
//! task with its positional hierarchy id.

mod memory;

pub use memory::{MemoryTaskStore, TaskFile};

use std::collections::HashSet;

use thiserror::Error;

use crate::domain::{TaskFields, TaskReference};

/// Access to the host chart's task records
pub trait TaskStore: Send {
    /// Read the current fields of a task, None if it does not exist
    fn get_task(&self, id: &str) -> Option<TaskFields>;

    /// Commit a full field set onto an existing task and refresh the host
    ///
    /// Returns false when the task does not exist.
    fn update_task(&mut self, id: &str, fields: &TaskFields) -> bool;

    /// Snapshot of all tasks in tree order with their hierarchy ids
    fn all_tasks_with_hierarchy(&self) -> Vec<TaskReference>;
}

/// True when making `parent` the parent of `task_id` would close a loop
///
/// `parent_of` looks up the current parent of a task id.
pub fn closes_parent_cycle<F>(task_id: &str, parent: &str, parent_of: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let mut seen = HashSet::new();
    let mut current = Some(parent.to_string());
    while let Some(id) = current {
        if id == task_id {
            return true;
        }
        if !seen.insert(id.clone()) {
            return false;
        }
        current = parent_of(&id);
    }
    false
}

/// Errors raised while building a task store from a file
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read task file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse task file as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse task file as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate task id: {0}")]
    DuplicateId(String),

    #[error("Task {task} references unknown parent {parent}")]
    UnknownParent { task: String, parent: String },

    #[error("Task {task} cannot have parent {parent}: the parent chain loops")]
    ParentCycle { task: String, parent: String },
}
