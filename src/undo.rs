//! Snapshot-based undo/redo for programmatic task mutations
//!
//! The host chart keeps its own history for edits the user makes by hand.
//! Changes the assistant applies go through this stack instead: every
//! mutation first snapshots the task's fixed field set, so the user can step
//! back and forward through assistant edits independently.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{TaskFields, TaskPatch};
use crate::store::TaskStore;

/// Default bound for each stack
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Deep copy of a task's fields at one moment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoSnapshot {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub field_values: TaskFields,
}

impl UndoSnapshot {
    fn capture(task_id: &str, field_values: TaskFields) -> Self {
        Self {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            field_values,
        }
    }
}

/// Two bounded LIFO stacks of task snapshots
#[derive(Debug, Clone)]
pub struct UndoStack {
    undo_stack: VecDeque<UndoSnapshot>,
    redo_stack: VecDeque<UndoSnapshot>,
    max_entries: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoStack {
    /// Create a stack pair bounded to [`DEFAULT_MAX_ENTRIES`]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_ENTRIES)
    }

    /// Create a stack pair with a custom bound (at least 1)
    pub fn with_limit(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            undo_stack: VecDeque::with_capacity(max_entries),
            redo_stack: VecDeque::with_capacity(max_entries),
            max_entries,
        }
    }

    /// Snapshot a task before mutating it
    ///
    /// Clears the redo stack: a new change starts a new timeline. Returns
    /// false, changing nothing, if the task does not exist.
    pub fn save_state(&mut self, store: &dyn TaskStore, task_id: &str) -> bool {
        debug!(%task_id, "UndoStack::save_state: called");
        let Some(fields) = store.get_task(task_id) else {
            debug!(%task_id, "UndoStack::save_state: task not found");
            return false;
        };
        push_bounded(&mut self.undo_stack, UndoSnapshot::capture(task_id, fields), self.max_entries);
        self.redo_stack.clear();
        true
    }

    /// Restore the most recent snapshot
    ///
    /// The task's current values move onto the redo stack first. Returns
    /// false when there is nothing to undo or the task has since vanished (the
    /// snapshot is discarded in that case).
    pub fn undo(&mut self, store: &mut dyn TaskStore) -> bool {
        let Some(snapshot) = self.undo_stack.pop_back() else {
            debug!("UndoStack::undo: nothing to undo");
            return false;
        };
        let applied = swap_in(store, snapshot, &mut self.redo_stack, self.max_entries);
        if applied {
            info!(undo_len = self.undo_stack.len(), redo_len = self.redo_stack.len(), "Undo applied");
        }
        applied
    }

    /// Mirror of [`UndoStack::undo`]
    pub fn redo(&mut self, store: &mut dyn TaskStore) -> bool {
        let Some(snapshot) = self.redo_stack.pop_back() else {
            debug!("UndoStack::redo: nothing to redo");
            return false;
        };
        let applied = swap_in(store, snapshot, &mut self.undo_stack, self.max_entries);
        if applied {
            info!(undo_len = self.undo_stack.len(), redo_len = self.redo_stack.len(), "Redo applied");
        }
        applied
    }

    /// Empty both stacks (session reset)
    pub fn clear_history(&mut self) {
        debug!("UndoStack::clear_history: called");
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// The snapshot the next undo would restore
    pub fn peek_undo(&self) -> Option<&UndoSnapshot> {
        self.undo_stack.back()
    }

    /// The snapshot the next redo would restore
    pub fn peek_redo(&self) -> Option<&UndoSnapshot> {
        self.redo_stack.back()
    }
}

fn push_bounded(stack: &mut VecDeque<UndoSnapshot>, snapshot: UndoSnapshot, max_entries: usize) {
    stack.push_back(snapshot);
    while stack.len() > max_entries {
        stack.pop_front();
    }
}

/// Write `snapshot` onto its task after saving the current values to `opposite`
fn swap_in(
    store: &mut dyn TaskStore,
    snapshot: UndoSnapshot,
    opposite: &mut VecDeque<UndoSnapshot>,
    max_entries: usize,
) -> bool {
    let Some(current) = store.get_task(&snapshot.task_id) else {
        warn!(task_id = %snapshot.task_id, "Task no longer exists, dropping snapshot");
        return false;
    };
    if !store.update_task(&snapshot.task_id, &snapshot.field_values) {
        warn!(task_id = %snapshot.task_id, "Task update rejected, dropping snapshot");
        return false;
    }
    push_bounded(opposite, UndoSnapshot::capture(&snapshot.task_id, current), max_entries);
    true
}

/// Apply an assistant-originated patch to a task, snapshotting it first
///
/// Returns false if the task does not exist.
pub fn apply_task_update(store: &mut dyn TaskStore, undo: &mut UndoStack, task_id: &str, patch: &TaskPatch) -> bool {
    debug!(%task_id, "apply_task_update: called");
    if !undo.save_state(store, task_id) {
        return false;
    }
    let Some(mut fields) = store.get_task(task_id) else {
        return false;
    };
    patch.apply_to(&mut fields);
    store.update_task(task_id, &fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;
    use crate::store::MemoryTaskStore;
    use proptest::prelude::*;

    fn store() -> MemoryTaskStore {
        MemoryTaskStore::from_tasks(vec![
            Task::new("a", TaskFields::named("Alpha")),
            Task::new("b", TaskFields::named("Beta")),
        ])
        .unwrap()
    }

    fn set_progress(store: &mut MemoryTaskStore, undo: &mut UndoStack, id: &str, progress: f64) {
        let patch = TaskPatch {
            progress: Some(progress),
            ..Default::default()
        };
        assert!(apply_task_update(store, undo, id, &patch));
    }

    #[test]
    fn test_undo_restores_previous_values() {
        let mut store = store();
        let mut undo = UndoStack::new();
        set_progress(&mut store, &mut undo, "a", 0.5);

        assert!(undo.undo(&mut store));
        assert_eq!(store.get_task("a").unwrap().progress, 0.0);
        assert!(undo.can_redo());
    }

    #[test]
    fn test_undo_then_redo_round_trips() {
        let mut store = store();
        let mut undo = UndoStack::new();
        set_progress(&mut store, &mut undo, "a", 0.5);
        set_progress(&mut store, &mut undo, "a", 0.8);

        let before = store.get_task("a").unwrap();
        assert!(undo.undo(&mut store));
        assert!(undo.redo(&mut store));
        assert_eq!(store.get_task("a").unwrap(), before);
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut store = store();
        let mut undo = UndoStack::new();
        assert!(!undo.undo(&mut store));
        assert!(!undo.redo(&mut store));
        assert_eq!(store.refresh_count(), 0);
    }

    #[test]
    fn test_save_state_missing_task() {
        let store = store();
        let mut undo = UndoStack::new();
        assert!(!undo.save_state(&store, "zzz"));
        assert_eq!(undo.undo_len(), 0);
    }

    #[test]
    fn test_save_state_clears_redo() {
        let mut store = store();
        let mut undo = UndoStack::new();
        set_progress(&mut store, &mut undo, "a", 0.3);
        assert!(undo.undo(&mut store));
        assert_eq!(undo.redo_len(), 1);

        assert!(undo.save_state(&store, "b"));
        assert_eq!(undo.redo_len(), 0);
    }

    #[test]
    fn test_undo_on_deleted_task_discards_snapshot() {
        let mut store = store();
        let mut undo = UndoStack::new();
        set_progress(&mut store, &mut undo, "b", 0.3);
        store.remove("b");

        assert!(!undo.undo(&mut store));
        assert_eq!(undo.undo_len(), 0);
        assert_eq!(undo.redo_len(), 0);
    }

    #[test]
    fn test_clear_history() {
        let mut store = store();
        let mut undo = UndoStack::new();
        set_progress(&mut store, &mut undo, "a", 0.3);
        set_progress(&mut store, &mut undo, "a", 0.4);
        undo.undo(&mut store);

        undo.clear_history();
        assert!(!undo.can_undo());
        assert!(!undo.can_redo());
    }

    #[test]
    fn test_oldest_entries_are_evicted() {
        let mut store = store();
        let mut undo = UndoStack::with_limit(3);
        for i in 1..=5 {
            set_progress(&mut store, &mut undo, "a", i as f64 / 10.0);
        }
        assert_eq!(undo.undo_len(), 3);
        // Oldest surviving snapshot was taken before the third update
        while undo.undo(&mut store) {}
        assert!((store.get_task("a").unwrap().progress - 0.2).abs() < f64::EPSILON);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Mutate { task: usize, progress: u8 },
        Undo,
        Redo,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..2, 0u8..=100).prop_map(|(task, progress)| Op::Mutate { task, progress }),
            Just(Op::Undo),
            Just(Op::Redo),
        ]
    }

    proptest! {
        #[test]
        fn prop_undo_redo_round_trip(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let mut store = store();
            let mut undo = UndoStack::new();
            let ids = ["a", "b"];
            for op in ops {
                match op {
                    Op::Mutate { task, progress } => {
                        set_progress(&mut store, &mut undo, ids[task], progress as f64 / 100.0);
                    }
                    Op::Undo => { undo.undo(&mut store); }
                    Op::Redo => { undo.redo(&mut store); }
                }
            }

            let before: Vec<TaskFields> = ids.iter().map(|id| store.get_task(id).unwrap()).collect();
            if undo.undo(&mut store) {
                prop_assert!(undo.redo(&mut store));
                let after: Vec<TaskFields> = ids.iter().map(|id| store.get_task(id).unwrap()).collect();
                prop_assert_eq!(before, after);
            }
        }

        #[test]
        fn prop_undo_stack_is_bounded(count in 0usize..200) {
            let mut store = store();
            let mut undo = UndoStack::new();
            for i in 0..count {
                set_progress(&mut store, &mut undo, "a", (i % 100) as f64 / 100.0);
            }
            prop_assert!(undo.undo_len() <= DEFAULT_MAX_ENTRIES);
            prop_assert_eq!(undo.undo_len(), count.min(DEFAULT_MAX_ENTRIES));
        }

        #[test]
        fn prop_save_undo_save_empties_redo(progress in 0u8..=100) {
            let mut store = store();
            let mut undo = UndoStack::new();
            set_progress(&mut store, &mut undo, "a", progress as f64 / 100.0);
            undo.undo(&mut store);
            prop_assert!(undo.save_state(&store, "a"));
            prop_assert_eq!(undo.redo_len(), 0);
        }
    }
}
