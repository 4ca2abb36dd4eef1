//! Chat error types

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::MessageId;

/// A failure reported by the model transport
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", display_transport_error(.status, .message))]
pub struct TransportError {
    /// HTTP-like status code, when the provider returned one
    #[serde(default)]
    pub status: Option<u16>,

    pub message: String,
}

fn display_transport_error(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Transport error {}: {}", status, message),
        None => format!("Transport error: {}", message),
    }
}

impl TransportError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::classify(self)
    }
}

/// User-facing grouping of transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    Quota,
    ModelNotFound,
    ContextTooLong,
    Network,
    Unknown,
}

impl ErrorCategory {
    /// Categorize from status code first, then message text
    pub fn classify(error: &TransportError) -> Self {
        debug!(status = ?error.status, "ErrorCategory::classify: called");
        let text = error.message.to_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

        let quota = mentions(&["quota", "insufficient", "billing", "credit"]);
        let context = mentions(&["context length", "context window", "too long", "maximum context", "token limit"]);
        let model_missing = text.contains("model") && mentions(&["not found", "does not exist", "unknown model"]);

        match error.status {
            Some(401) | Some(403) => Self::Auth,
            Some(402) => Self::Quota,
            Some(429) if quota => Self::Quota,
            Some(429) => Self::RateLimit,
            Some(404) if text.contains("model") => Self::ModelNotFound,
            Some(413) => Self::ContextTooLong,
            Some(400) if context => Self::ContextTooLong,
            Some(502) | Some(503) | Some(504) => Self::Network,
            _ if mentions(&["api key", "unauthorized", "authentication", "forbidden"]) => Self::Auth,
            _ if quota => Self::Quota,
            _ if mentions(&["rate limit", "too many requests"]) => Self::RateLimit,
            _ if model_missing => Self::ModelNotFound,
            _ if context => Self::ContextTooLong,
            None if mentions(&["network", "connection", "timeout", "timed out", "dns", "unreachable", "closed"]) => {
                Self::Network
            }
            _ => Self::Unknown,
        }
    }

    /// Short notice suitable for a toast
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Auth => "Authentication failed. Check the API key configured for this model.",
            Self::RateLimit => "The model provider is rate limiting requests. Wait a moment and retry.",
            Self::Quota => "The account has run out of quota or credit.",
            Self::ModelNotFound => "The configured model was not found.",
            Self::ContextTooLong => "The conversation is too long for the model. Start a new chat or remove context.",
            Self::Network => "Could not reach the model provider. Check the network connection.",
            Self::Unknown => "The assistant request failed.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate-limit",
            Self::Quota => "quota",
            Self::ModelNotFound => "model-not-found",
            Self::ContextTooLong => "context-too-long",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Errors from chat session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No agent selected")]
    NoAgentSelected,

    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Nothing to send: the message is empty")]
    EmptyMessage,

    #[error("Cannot retry: no user message precedes {0}")]
    NothingToRetry(MessageId),

    #[error("Message {0} has no structured result")]
    NotStructured(MessageId),

    #[error("Message {0} was already applied")]
    AlreadyApplied(MessageId),

    #[error("Structured result type '{0}' cannot be applied")]
    UnsupportedResultType(String),

    #[error("Malformed structured result: {0}")]
    InvalidResult(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {task} cannot move under {parent}: it would become its own ancestor")]
    ParentCycle { task: String, parent: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(status: Option<u16>, message: &str) -> ErrorCategory {
        TransportError::new(status, message).category()
    }

    #[test]
    fn test_classify_by_status() {
        assert_eq!(category(Some(401), "bad key"), ErrorCategory::Auth);
        assert_eq!(category(Some(403), "nope"), ErrorCategory::Auth);
        assert_eq!(category(Some(429), "slow down"), ErrorCategory::RateLimit);
        assert_eq!(category(Some(429), "You exceeded your current quota"), ErrorCategory::Quota);
        assert_eq!(category(Some(402), "payment required"), ErrorCategory::Quota);
        assert_eq!(category(Some(404), "model gpt-x not found"), ErrorCategory::ModelNotFound);
        assert_eq!(category(Some(413), "payload"), ErrorCategory::ContextTooLong);
        assert_eq!(
            category(Some(400), "This model's maximum context length is 8192 tokens"),
            ErrorCategory::ContextTooLong
        );
        assert_eq!(category(Some(503), "overloaded"), ErrorCategory::Network);
    }

    #[test]
    fn test_classify_by_message() {
        assert_eq!(category(None, "Invalid API key provided"), ErrorCategory::Auth);
        assert_eq!(category(None, "Rate limit reached"), ErrorCategory::RateLimit);
        assert_eq!(category(None, "connection reset by peer"), ErrorCategory::Network);
        assert_eq!(category(None, "request timed out"), ErrorCategory::Network);
        assert_eq!(category(Some(500), "internal error"), ErrorCategory::Unknown);
        assert_eq!(category(None, "something odd"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TransportError::new(Some(429), "slow down").to_string(),
            "Transport error 429: slow down"
        );
        assert_eq!(TransportError::network("offline").to_string(), "Transport error: offline");
        assert_eq!(ErrorCategory::ContextTooLong.to_string(), "context-too-long");
    }

    #[test]
    fn test_every_category_has_a_message() {
        for category in [
            ErrorCategory::Auth,
            ErrorCategory::RateLimit,
            ErrorCategory::Quota,
            ErrorCategory::ModelNotFound,
            ErrorCategory::ContextTooLong,
            ErrorCategory::Network,
            ErrorCategory::Unknown,
        ] {
            assert!(!category.user_message().is_empty());
        }
    }
}
