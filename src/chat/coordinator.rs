//! Streaming response coordinator
//!
//! Drives the single in-flight assistant message through
//! `start -> append* -> (finish | fail | abort)`. Finishing classifies the
//! content (structured JSON or markdown) and stores the display HTML.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::classify::{Classification, classify};
use super::error::{ErrorCategory, TransportError};
use super::history::ConversationHistory;
use super::types::{Message, TokenUsage, ToolCallStatus};
use crate::citation::CitationRenderer;
use crate::domain::MessageId;
use crate::registry::{ApplyOptions, ResultRegistry};

/// What a failed turn left behind
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFailure {
    pub message_id: MessageId,

    /// True when the message had no content and was dropped from history
    pub removed: bool,

    pub category: ErrorCategory,

    pub error: TransportError,
}

/// Owner of the conversation history and the streaming state machine
pub struct StreamCoordinator {
    history: ConversationHistory,
    current: Option<MessageId>,
    tool_calls: HashMap<String, ToolCallStatus>,
    usage_totals: TokenUsage,
    renderer: CitationRenderer,
    registry: Arc<dyn ResultRegistry>,
}

impl StreamCoordinator {
    pub fn new(renderer: CitationRenderer, registry: Arc<dyn ResultRegistry>) -> Self {
        debug!("StreamCoordinator::new: called");
        Self {
            history: ConversationHistory::new(),
            current: None,
            tool_calls: HashMap::new(),
            usage_totals: TokenUsage::default(),
            renderer,
            registry,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Mutable history access for adding user messages and truncation
    ///
    /// Callers must not touch the in-flight message through this.
    pub fn history_mut(&mut self) -> &mut ConversationHistory {
        &mut self.history
    }

    pub fn current_id(&self) -> Option<&MessageId> {
        self.current.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.current.is_some()
    }

    /// Whether `id` is the message currently streaming
    pub fn is_current(&self, id: &MessageId) -> bool {
        self.current.as_ref() == Some(id)
    }

    pub fn tool_calls(&self) -> &HashMap<String, ToolCallStatus> {
        &self.tool_calls
    }

    pub fn usage_totals(&self) -> TokenUsage {
        self.usage_totals
    }

    pub fn renderer(&self) -> &CitationRenderer {
        &self.renderer
    }

    /// Begin a new assistant message
    ///
    /// Starting while another stream is in flight is a caller bug. In
    /// release builds the previous stream is finalized first so the single
    /// streaming message invariant still holds.
    pub fn start_streaming(&mut self) -> MessageId {
        debug_assert!(
            self.current.is_none(),
            "start_streaming called while {:?} is in flight",
            self.current
        );
        if let Some(previous) = self.current.clone() {
            warn!(%previous, "Stream started while another was in flight, finalizing it");
            self.abort_streaming();
        }

        self.tool_calls.clear();
        let id = self.history.push(Message::streaming_assistant());
        info!(message_id = %id, "Stream started");
        self.current = Some(id.clone());
        id
    }

    /// Append a chunk to the in-flight message
    ///
    /// Returns false, changing nothing, when no stream is in flight.
    pub fn append_text(&mut self, chunk: &str) -> bool {
        let Some(id) = &self.current else {
            debug!("StreamCoordinator::append_text: no stream in flight, dropping chunk");
            return false;
        };
        match self.history.get_mut(id) {
            Some(message) => {
                message.content.push_str(chunk);
                true
            }
            None => {
                warn!(message_id = %id, "In-flight message missing from history");
                false
            }
        }
    }

    /// Finalize the in-flight message and render it
    pub fn finish_streaming(&mut self, usage: Option<TokenUsage>) -> Option<MessageId> {
        let id = self.current.take()?;
        if let Some(usage) = &usage {
            self.usage_totals.accumulate(usage);
        }
        let Some(message) = self.history.get_mut(&id) else {
            warn!(message_id = %id, "Finished message missing from history");
            return None;
        };
        message.streaming = false;
        message.tokens = usage;
        render_message(message, &self.renderer, self.registry.as_ref());
        info!(
            message_id = %id,
            structured = message.is_structured,
            chars = message.content.len(),
            "Stream finished"
        );
        Some(id)
    }

    /// Terminate the in-flight message with a transport error
    ///
    /// An empty message is removed; partial content is kept and rendered as
    /// markdown. The error is returned for separate surfacing and never
    /// written into the transcript.
    pub fn fail_streaming(&mut self, error: TransportError) -> Option<StreamFailure> {
        let id = self.current.take()?;
        let category = error.category();
        warn!(message_id = %id, %category, error = %error, "Stream failed");

        let removed = self.settle(&id);
        Some(StreamFailure {
            message_id: id,
            removed,
            category,
            error,
        })
    }

    /// Finalize the in-flight message without an error
    ///
    /// Used when a retry or agent switch interrupts a turn. Returns the id
    /// and whether the (empty) message was removed.
    pub fn abort_streaming(&mut self) -> Option<(MessageId, bool)> {
        let id = self.current.take()?;
        debug!(message_id = %id, "StreamCoordinator::abort_streaming: called");
        let removed = self.settle(&id);
        Some((id, removed))
    }

    /// Remove an empty message or render partial content as markdown
    fn settle(&mut self, id: &MessageId) -> bool {
        let empty = self.history.get(id).is_none_or(|m| m.content.is_empty());
        if empty {
            self.history.remove(id);
            return true;
        }
        if let Some(message) = self.history.get_mut(id) {
            message.streaming = false;
            message.rendered_html = Some(self.renderer.render_markdown(&message.content).html);
        }
        false
    }

    pub fn record_tool_call(&mut self, id: &str, name: &str, args: serde_json::Value) {
        debug!(%id, %name, "StreamCoordinator::record_tool_call: called");
        self.tool_calls.insert(
            id.to_string(),
            ToolCallStatus {
                id: id.to_string(),
                name: name.to_string(),
                args,
                result: None,
            },
        );
    }

    /// Attach a result to a recorded call; false for an unknown id
    pub fn record_tool_result(&mut self, id: &str, result: &str) -> bool {
        match self.tool_calls.get_mut(id) {
            Some(status) => {
                status.result = Some(result.to_string());
                true
            }
            None => {
                debug!(%id, "StreamCoordinator::record_tool_result: unknown tool call");
                false
            }
        }
    }

    /// Re-render a structured message (after it was applied)
    pub fn rerender(&mut self, id: &MessageId, options: &ApplyOptions) -> bool {
        let Some(message) = self.history.get_mut(id) else {
            return false;
        };
        let Some(data) = &message.structured_data else {
            return false;
        };
        message.rendered_html = Some(self.registry.render_result(data, options));
        true
    }

    /// Drop the conversation (new agent or task context)
    pub fn clear(&mut self) {
        debug!("StreamCoordinator::clear: called");
        self.current = None;
        self.tool_calls.clear();
        self.history.clear();
    }

    /// Clear and zero the running usage totals
    pub fn reset(&mut self) {
        self.clear();
        self.usage_totals = TokenUsage::default();
    }
}

/// Classify finished content and store its display form
fn render_message(message: &mut Message, renderer: &CitationRenderer, registry: &dyn ResultRegistry) {
    match classify(&message.content, registry) {
        Classification::Structured(data) => {
            let options = ApplyOptions {
                can_apply: !message.applied,
                message_id: Some(message.id.clone()),
            };
            message.rendered_html = Some(registry.render_result(&data, &options));
            message.is_structured = true;
            message.structured_data = Some(data);
        }
        Classification::Markdown => {
            message.is_structured = false;
            message.structured_data = None;
            message.rendered_html = Some(renderer.render_markdown(&message.content).html);
        }
    }
}
