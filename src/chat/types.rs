//! Conversation types shared by history, coordinator and transport

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::TransportError;
use crate::domain::{MessageId, TaskReference};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Token usage reported by the provider at the end of a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Add another turn's usage into this running total
    pub fn accumulate(&mut self, other: &TokenUsage) {
        debug!(%other.total_tokens, "TokenUsage::accumulate: called");
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Task context shown above a user message (e.g. "split this task")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBubble {
    pub task_data: serde_json::Value,
    pub mode: String,
}

/// Extra data attached to a message when it is added
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageMeta {
    pub input_bubble: Option<InputBubble>,
    pub referenced_tasks: Vec<TaskReference>,
}

impl MessageMeta {
    pub fn with_tasks(referenced_tasks: Vec<TaskReference>) -> Self {
        Self {
            input_bubble: None,
            referenced_tasks,
        }
    }
}

/// One chat message
///
/// Mutated in place only while `streaming` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub streaming: bool,

    #[serde(default)]
    pub is_structured: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<serde_json::Value>,

    /// Display HTML produced when the message was finalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_html: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_bubble: Option<InputBubble>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_tasks: Vec<TaskReference>,

    /// A structured result from this message has been applied to the chart
    #[serde(default)]
    pub applied: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, meta: MessageMeta) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            streaming: false,
            is_structured: false,
            structured_data: None,
            rendered_html: None,
            tokens: None,
            input_bubble: meta.input_bubble,
            referenced_tasks: meta.referenced_tasks,
            applied: false,
        }
    }

    /// An empty assistant message in the streaming state
    pub fn streaming_assistant() -> Self {
        let mut message = Self::new(Role::Assistant, String::new(), MessageMeta::default());
        message.streaming = true;
        message
    }

    /// The `type` field of the structured payload, if any
    pub fn structured_type(&self) -> Option<&str> {
        self.structured_data.as_ref()?.get("type")?.as_str()
    }
}

/// Progress of one tool call made during a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallStatus {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// A role/content pair as handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Everything the transport needs for one turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportRequest {
    pub agent_id: String,
    pub turns: Vec<Turn>,
}

/// One event pushed by a transport while a turn is running
///
/// A well-behaved transport sends any number of chunk and tool events and
/// then exactly one `finish` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Chunk {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    ToolResult {
        id: String,
        result: String,
    },
    Finish {
        #[serde(default)]
        usage: Option<TokenUsage>,
    },
    Error(TransportError),
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        StreamEvent::Chunk { text: text.into() }
    }

    pub fn finish(usage: Option<TokenUsage>) -> Self {
        StreamEvent::Finish { usage }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finish { .. } | StreamEvent::Error(_))
    }
}
