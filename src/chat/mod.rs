//! Chat orchestration
//!
//! - [`ChatSession`] - one chat panel: agent binding, turns, retry, citations
//! - [`StreamCoordinator`] - lifecycle of the single in-flight assistant message
//! - [`ConversationHistory`] - ordered messages of the current conversation
//! - [`ModelTransport`] - the streaming boundary to the model provider
//! - [`ConversationTranscript`] - optional JSONL debugging log

mod classify;
mod coordinator;
mod error;
mod history;
mod session;
mod transcript;
mod transport;
mod types;

pub use classify::{Classification, classify, parse_structured};
pub use coordinator::{StreamCoordinator, StreamFailure};
pub use error::{ErrorCategory, SessionError, TransportError};
pub use history::ConversationHistory;
pub use session::{ChatSession, TASK_NOT_FOUND_NOTICE, TurnOutcome};
pub use transcript::{ConversationTranscript, EntryType, TranscriptEntry};
pub use transport::{ModelTransport, ScriptError, ScriptedTransport};
pub use types::{
    InputBubble, Message, MessageMeta, Role, StreamEvent, TokenUsage, ToolCallStatus, TransportRequest, Turn,
};
