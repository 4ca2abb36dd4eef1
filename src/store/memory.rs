//! In-memory task store
//!
//! Used by the CLI (loaded from a YAML/JSON task file) and by tests. Tasks
//! keep their file order; children are ordered by their position among
//! siblings, and hierarchy ids (`1`, `1.2`, `1.2.3`) are computed from that
//! order on every snapshot so they shift exactly the way the chart's do.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{StoreError, TaskStore, closes_parent_cycle};
use crate::domain::{Task, TaskFields, TaskReference};

/// On-disk task file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFile {
    pub tasks: Vec<Task>,
}

/// Task store backed by a Vec
#[derive(Debug, Clone, Default)]
pub struct MemoryTaskStore {
    tasks: Vec<Task>,
    /// Number of committed updates (each one is a host refresh)
    refresh_count: u64,
}

impl MemoryTaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from tasks, validating ids and parent links
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self, StoreError> {
        debug!(task_count = tasks.len(), "MemoryTaskStore::from_tasks: called");
        let mut seen = HashSet::new();
        for task in &tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(StoreError::DuplicateId(task.id.clone()));
            }
        }
        for task in &tasks {
            if let Some(parent) = &task.fields.parent
                && !seen.contains(parent.as_str())
            {
                return Err(StoreError::UnknownParent {
                    task: task.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
        let parent_of: HashMap<&str, &str> = tasks
            .iter()
            .filter_map(|t| t.fields.parent.as_deref().map(|p| (t.id.as_str(), p)))
            .collect();
        for (&task, &parent) in &parent_of {
            if closes_parent_cycle(task, parent, |id: &str| parent_of.get(id).map(|p| p.to_string())) {
                return Err(StoreError::ParentCycle {
                    task: task.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        Ok(Self {
            tasks,
            refresh_count: 0,
        })
    }

    /// Load a task file (`.json` is parsed as JSON, anything else as YAML)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let file: TaskFile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        info!(path = %path.display(), tasks = file.tasks.len(), "Loaded task file");
        Self::from_tasks(file.tasks)
    }

    /// Move a task to a new position in the underlying order
    ///
    /// This changes the hierarchy ids of its siblings.
    pub fn move_to(&mut self, id: &str, position: usize) -> bool {
        let Some(index) = self.tasks.iter().position(|t| t.id == id) else {
            return false;
        };
        let task = self.tasks.remove(index);
        let position = position.min(self.tasks.len());
        self.tasks.insert(position, task);
        self.refresh_count += 1;
        true
    }

    /// Remove a task (children are re-parented to the top level)
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        let removed = self.tasks.remove(index);
        for task in &mut self.tasks {
            if task.fields.parent.as_deref() == Some(id) {
                task.fields.parent = None;
            }
        }
        self.refresh_count += 1;
        Some(removed)
    }

    /// All tasks in storage order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// How many times the host would have been asked to refresh
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    /// Depth-first walk assigning positional ids
    fn walk(
        &self,
        parent: Option<&str>,
        prefix: &str,
        children: &HashMap<Option<&str>, Vec<usize>>,
        visited: &mut HashSet<usize>,
        out: &mut Vec<TaskReference>,
    ) {
        let Some(indices) = children.get(&parent) else {
            return;
        };
        for (position, &index) in indices.iter().enumerate() {
            let hierarchy_id = if prefix.is_empty() {
                (position + 1).to_string()
            } else {
                format!("{}.{}", prefix, position + 1)
            };
            self.visit(index, hierarchy_id, children, visited, out);
        }
    }

    fn visit(
        &self,
        index: usize,
        hierarchy_id: String,
        children: &HashMap<Option<&str>, Vec<usize>>,
        visited: &mut HashSet<usize>,
        out: &mut Vec<TaskReference>,
    ) {
        if !visited.insert(index) {
            return;
        }
        let task = &self.tasks[index];
        out.push(TaskReference::new(&task.id, &hierarchy_id, &task.fields.text));
        self.walk(Some(task.id.as_str()), &hierarchy_id, children, visited, out);
    }
}

impl TaskStore for MemoryTaskStore {
    fn get_task(&self, id: &str) -> Option<TaskFields> {
        self.tasks.iter().find(|t| t.id == id).map(|t| t.fields.clone())
    }

    fn update_task(&mut self, id: &str, fields: &TaskFields) -> bool {
        debug!(%id, "MemoryTaskStore::update_task: called");
        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.fields = fields.clone();
                self.refresh_count += 1;
                true
            }
            None => {
                debug!(%id, "MemoryTaskStore::update_task: task not found");
                false
            }
        }
    }

    fn all_tasks_with_hierarchy(&self) -> Vec<TaskReference> {
        let ids: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();

        // Orphans (parent no longer present) are shown at the top level
        let mut children: HashMap<Option<&str>, Vec<usize>> = HashMap::new();
        for (index, task) in self.tasks.iter().enumerate() {
            let parent = task.fields.parent.as_deref().filter(|p| ids.contains(p) && *p != task.id);
            children.entry(parent).or_default().push(index);
        }

        let mut out = Vec::with_capacity(self.tasks.len());
        let mut visited = HashSet::new();
        self.walk(None, "", &children, &mut visited, &mut out);

        // Tasks caught in a parent loop are unreachable from the roots
        let mut next_root = children.get(&None).map_or(0, Vec::len);
        for index in 0..self.tasks.len() {
            if visited.contains(&index) {
                continue;
            }
            warn!(task_id = %self.tasks[index].id, "Task is part of a parent loop, listing it at the top level");
            next_root += 1;
            self.visit(index, next_root.to_string(), &children, &mut visited, &mut out);
        }
        out
    }
}
