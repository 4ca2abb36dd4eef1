//! Chat event vocabulary
//!
//! [`ChatRequest`] is what the UI asks of the session. [`ChatEvent`] is what
//! the session reports back:
//! - `AgentSelected`, `RetryRequested`, `MessageSent` echo accepted requests
//! - streaming lifecycle: `StreamStarted`, `StreamFinished`, `StreamFailed`
//! - history changes: `MessageRemoved`, `HistoryTruncated`, `HistoryCleared`
//! - chart effects: `NavigateToTask`, `UndoApplied`, `RedoApplied`
//!
//! The two enums share no type, so a host that pipes bus events back into
//! the session cannot replay an echo as a new request.

use serde::{Deserialize, Serialize};

use crate::chat::{ErrorCategory, TokenUsage};
use crate::domain::{MessageId, TaskReference};

/// A request from the chat panel or chart
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatRequest {
    /// Hand the chat to an agent, optionally bound to a task
    SelectAgent {
        agent_id: String,
        #[serde(default)]
        task_context: Option<TaskReference>,
    },
    /// Regenerate from the given message
    Retry { message_id: MessageId },
    /// Submit a user message
    SendMessage {
        content: String,
        #[serde(default)]
        referenced_tasks: Vec<TaskReference>,
    },
}

impl ChatRequest {
    pub fn request_type(&self) -> &'static str {
        match self {
            ChatRequest::SelectAgent { .. } => "SelectAgent",
            ChatRequest::Retry { .. } => "Retry",
            ChatRequest::SendMessage { .. } => "SendMessage",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    // === Accepted requests ===
    /// A new agent (optionally bound to a task) took over the chat
    AgentSelected {
        agent_id: String,
        #[serde(default)]
        task_context: Option<TaskReference>,
    },
    /// History is about to be regenerated from this message
    RetryRequested { message_id: MessageId },
    /// A user message was added to the history
    MessageSent {
        message_id: MessageId,
        content: String,
        #[serde(default)]
        referenced_tasks: Vec<TaskReference>,
    },

    // === Streaming lifecycle ===
    StreamStarted { message_id: MessageId },
    StreamFinished {
        message_id: MessageId,
        is_structured: bool,
        usage: Option<TokenUsage>,
    },
    /// The turn failed; `removed` is true when the empty message was dropped
    StreamFailed {
        message_id: MessageId,
        category: ErrorCategory,
        error: String,
        removed: bool,
    },

    // === History ===
    MessageRemoved { message_id: MessageId },
    HistoryTruncated { retained: usize },
    HistoryCleared,

    // === Chart effects ===
    NavigateToTask { task_id: String, hierarchy_id: String },
    UndoApplied { task_id: String },
    RedoApplied { task_id: String },
}

impl ChatEvent {
    /// Message the event concerns, if any
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            ChatEvent::RetryRequested { message_id }
            | ChatEvent::MessageSent { message_id, .. }
            | ChatEvent::StreamStarted { message_id }
            | ChatEvent::StreamFinished { message_id, .. }
            | ChatEvent::StreamFailed { message_id, .. }
            | ChatEvent::MessageRemoved { message_id } => Some(message_id),
            ChatEvent::AgentSelected { .. }
            | ChatEvent::HistoryTruncated { .. }
            | ChatEvent::HistoryCleared
            | ChatEvent::NavigateToTask { .. }
            | ChatEvent::UndoApplied { .. }
            | ChatEvent::RedoApplied { .. } => None,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::AgentSelected { .. } => "AgentSelected",
            ChatEvent::RetryRequested { .. } => "RetryRequested",
            ChatEvent::MessageSent { .. } => "MessageSent",
            ChatEvent::StreamStarted { .. } => "StreamStarted",
            ChatEvent::StreamFinished { .. } => "StreamFinished",
            ChatEvent::StreamFailed { .. } => "StreamFailed",
            ChatEvent::MessageRemoved { .. } => "MessageRemoved",
            ChatEvent::HistoryTruncated { .. } => "HistoryTruncated",
            ChatEvent::HistoryCleared => "HistoryCleared",
            ChatEvent::NavigateToTask { .. } => "NavigateToTask",
            ChatEvent::UndoApplied { .. } => "UndoApplied",
            ChatEvent::RedoApplied { .. } => "RedoApplied",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_and_message_id() {
        let id = MessageId::new();
        let event = ChatEvent::StreamStarted { message_id: id.clone() };
        assert_eq!(event.event_type(), "StreamStarted");
        assert_eq!(event.message_id(), Some(&id));
        assert_eq!(ChatEvent::HistoryCleared.message_id(), None);
    }

    #[test]
    fn test_request_from_json() {
        let request: ChatRequest = serde_json::from_str(r#"{"type":"SendMessage","content":"hi"}"#).unwrap();
        assert_eq!(
            request,
            ChatRequest::SendMessage {
                content: "hi".to_string(),
                referenced_tasks: vec![],
            }
        );

        let request: ChatRequest = serde_json::from_str(r#"{"type":"SelectAgent","agent_id":"planner"}"#).unwrap();
        assert_eq!(request.request_type(), "SelectAgent");
    }

    #[test]
    fn test_echoed_event_is_not_a_request() {
        let echo = ChatEvent::MessageSent {
            message_id: MessageId::new(),
            content: "hi".to_string(),
            referenced_tasks: vec![],
        };
        let json = serde_json::to_string(&echo).unwrap();
        assert!(serde_json::from_str::<ChatRequest>(&json).is_err());

        let json = serde_json::to_string(&ChatEvent::AgentSelected {
            agent_id: "planner".to_string(),
            task_context: None,
        })
        .unwrap();
        assert!(serde_json::from_str::<ChatRequest>(&json).is_err());
    }
}
