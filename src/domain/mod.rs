//! Domain types for GanttPilot
//!
//! Task records and references shared by the resolver, composer, undo stack
//! and chat session, plus message id generation.

mod id;
mod task;

pub use id::{MessageId, generate_id};
pub use task::{Priority, Task, TaskFields, TaskPatch, TaskReference};
