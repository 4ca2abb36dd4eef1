//! Gantt task records as seen by the chat core
//!
//! The chart owns the live task records. The chat core only ever sees
//! copies: `TaskFields` for undo snapshots and `TaskReference` for mentions
//! and citations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lightweight pointer to a task, copied at selection time
///
/// Not a live binding: the hierarchy id is positional and can go stale when
/// tasks are reordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskReference {
    /// Stable task id
    pub id: String,

    /// Positional label such as `1.2.3`
    pub hierarchy_id: String,

    /// Task name at selection time
    pub text: String,
}

impl TaskReference {
    pub fn new(id: impl Into<String>, hierarchy_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hierarchy_id: hierarchy_id.into(),
            text: text.into(),
        }
    }
}

/// Priority column of a Gantt task
///
/// Agents also write `normal`, `urgent` or `critical`; those are read as the
/// nearest chart value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    #[serde(alias = "normal")]
    Medium,
    #[serde(alias = "urgent", alias = "critical")]
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed field set captured by undo snapshots
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskFields {
    /// Task name
    pub text: String,

    pub start_date: Option<NaiveDate>,

    pub end_date: Option<NaiveDate>,

    /// Duration in working days
    pub duration: Option<u32>,

    /// Completion ratio in `0.0..=1.0`
    pub progress: f64,

    pub priority: Option<Priority>,

    /// Free-form status label (configured by the host)
    pub status: Option<String>,

    pub assignee: Option<String>,

    /// Short description shown in the grid
    pub summary: Option<String>,

    /// Parent task id (None for top-level tasks)
    pub parent: Option<String>,

    /// Whether the task's children are expanded in the chart
    pub open: bool,
}

impl TaskFields {
    /// Create fields for a task with just a name
    pub fn named(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            open: true,
            ..Default::default()
        }
    }

    /// Set the parent task
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// A task record with its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    #[serde(flatten)]
    pub fields: TaskFields,
}

impl Task {
    pub fn new(id: impl Into<String>, fields: TaskFields) -> Self {
        Self { id: id.into(), fields }
    }
}

/// Partial update applied to a task by the assistant
///
/// Absent fields are left untouched. `parent: Some(None)` moves the task to
/// the top level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration: Option<u32>,
    pub progress: Option<f64>,
    pub priority: Option<Priority>,
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub summary: Option<String>,
    #[serde(with = "double_option")]
    pub parent: Option<Option<String>>,
    pub open: Option<bool>,
}

impl TaskPatch {
    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this patch onto a set of fields
    pub fn apply_to(&self, fields: &mut TaskFields) {
        if let Some(text) = &self.text {
            fields.text = text.clone();
        }
        if let Some(start) = self.start_date {
            fields.start_date = Some(start);
        }
        if let Some(end) = self.end_date {
            fields.end_date = Some(end);
        }
        if let Some(duration) = self.duration {
            fields.duration = Some(duration);
        }
        if let Some(progress) = self.progress {
            fields.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(priority) = self.priority {
            fields.priority = Some(priority);
        }
        if let Some(status) = &self.status {
            fields.status = Some(status.clone());
        }
        if let Some(assignee) = &self.assignee {
            fields.assignee = Some(assignee.clone());
        }
        if let Some(summary) = &self.summary {
            fields.summary = Some(summary.clone());
        }
        if let Some(parent) = &self.parent {
            fields.parent = parent.clone();
        }
        if let Some(open) = self.open {
            fields.open = open;
        }
    }
}

/// Distinguishes a missing `parent` key from an explicit `null`
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}
