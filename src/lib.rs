//! GanttPilot - conversational assistant core for a Gantt task planner
//!
//! The chart owns the tasks; this crate owns the conversation about them.
//! An assistant reply streams in through a [`chat::ModelTransport`], is
//! rendered as markdown with clickable task citation chips (or as a
//! structured result the user can apply), and every change the assistant
//! makes to a task can be stepped back with the undo stack.
//!
//! # Modules
//!
//! - [`chat`] - session, streaming coordinator, history, transport
//! - [`citation`] - `[#1.2 Name]` extraction and chip rendering
//! - [`resolver`] - citation and mention lookup against the task list
//! - [`composer`] - `@`-mention input with atomic task tokens
//! - [`undo`] - snapshot undo/redo for programmatic task edits
//! - [`store`] - task store boundary and in-memory implementation
//! - [`events`] - typed event bus between session and UI
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod chat;
pub mod citation;
pub mod cli;
pub mod composer;
pub mod config;
pub mod domain;
pub mod events;
pub mod notify;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod undo;

// Re-export commonly used types
pub use chat::{
    ChatSession, ConversationHistory, ErrorCategory, Message, ModelTransport, Role, ScriptedTransport,
    SessionError, StreamCoordinator, StreamEvent, TokenUsage, TransportError,
};
pub use citation::{Citation, CitationRenderer, RenderedContent, extract_citations};
pub use composer::{ComposerKey, KeyOutcome, MentionComposer, MessagePayload};
pub use config::Config;
pub use domain::{MessageId, Priority, Task, TaskFields, TaskPatch, TaskReference};
pub use events::{ChatEvent, ChatRequest, EventBus};
pub use notify::{Notifier, Severity};
pub use registry::{ApplyOptions, ResultRegistry, StructuredTypes};
pub use resolver::{resolve_citation, search_candidates};
pub use store::{MemoryTaskStore, TaskStore};
pub use undo::{UndoSnapshot, UndoStack};
