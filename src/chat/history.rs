//! Conversation history store
//!
//! Sole owner of the messages of the current conversation. Everything else
//! refers to messages by [`MessageId`].

use tracing::debug;

use super::types::{Message, MessageMeta, Role, Turn};
use crate::domain::MessageId;

/// Ordered chat messages
///
/// At most one message is streaming at any time; the coordinator enforces
/// that by finalizing before it starts another.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished message
    pub fn add_message(&mut self, role: Role, content: impl Into<String>, meta: MessageMeta) -> MessageId {
        let message = Message::new(role, content, meta);
        let id = message.id.clone();
        debug!(%id, %role, "ConversationHistory::add_message: called");
        self.messages.push(message);
        id
    }

    /// Append an already-built message (used for streaming placeholders)
    pub fn push(&mut self, message: Message) -> MessageId {
        let id = message.id.clone();
        debug!(%id, role = %message.role, "ConversationHistory::push: called");
        self.messages.push(message);
        id
    }

    /// Keep `[0, index]` and drop everything after it
    pub fn remove_messages_after(&mut self, index: usize) -> Vec<Message> {
        if index + 1 >= self.messages.len() {
            return Vec::new();
        }
        let removed = self.messages.split_off(index + 1);
        debug!(index, removed = removed.len(), "ConversationHistory::remove_messages_after: truncated");
        removed
    }

    /// Role/content pairs in order, for the transport
    ///
    /// Skips messages that are still streaming and assistant messages that
    /// ended up empty.
    pub fn conversation_history(&self) -> Vec<Turn> {
        self.turns_with(|m| m.content.clone())
    }

    /// Like [`ConversationHistory::conversation_history`] with custom content
    pub fn turns_with(&self, content: impl Fn(&Message) -> String) -> Vec<Turn> {
        self.messages
            .iter()
            .filter(|m| !m.streaming)
            .filter(|m| !(m.role == Role::Assistant && m.content.is_empty()))
            .map(|m| Turn {
                role: m.role,
                content: content(m),
            })
            .collect()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    pub fn index_of(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.index_of(id)?;
        debug!(%id, index, "ConversationHistory::remove: called");
        Some(self.messages.remove(index))
    }

    pub fn clear(&mut self) {
        debug!(count = self.messages.len(), "ConversationHistory::clear: called");
        self.messages.clear();
    }

    /// The message currently streaming, if any
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.streaming)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}
