//! Chat session
//!
//! One `ChatSession` per chat panel. It owns the streaming coordinator (and
//! through it the conversation history), the undo stack and the handles to
//! the task store, transport, notifier and event bus. A turn runs the
//! transport in a spawned tokio task; its events come back over an mpsc
//! channel and are applied here in receive order.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::coordinator::{StreamCoordinator, StreamFailure};
use super::error::{SessionError, TransportError};
use super::history::ConversationHistory;
use super::transcript::ConversationTranscript;
use super::transport::ModelTransport;
use super::types::{Message, MessageMeta, Role, StreamEvent, TokenUsage, TransportRequest};
use crate::citation::{CitationError, CitationRenderer};
use crate::composer::MessagePayload;
use crate::config::Config;
use crate::domain::{MessageId, TaskPatch, TaskReference};
use crate::events::{ChatEvent, ChatRequest, EventBus};
use crate::notify::{Notifier, Severity, TracingNotifier};
use crate::registry::{ApplyOptions, ResultRegistry, StructuredTypes};
use crate::resolver::resolve_citation;
use crate::store::{TaskStore, closes_parent_cycle};
use crate::undo::{UndoStack, apply_task_update};

/// Buffered stream events per turn
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Shown when a citation cannot be resolved
pub const TASK_NOT_FOUND_NOTICE: &str = "Task not found. It may have been deleted or renumbered.";

/// Structured type the session knows how to apply
const TASK_UPDATE_TYPE: &str = "task_update";

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Finished(MessageId),
    Failed(StreamFailure),
}

struct ActiveTurn {
    message_id: MessageId,
    rx: mpsc::Receiver<StreamEvent>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Deserialize)]
struct TaskUpdateEntry {
    task_id: String,
    #[serde(default)]
    changes: TaskPatch,
}

#[derive(Debug, Deserialize)]
struct TaskUpdateResult {
    #[serde(default)]
    updates: Vec<TaskUpdateEntry>,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    changes: Option<TaskPatch>,
}

impl TaskUpdateResult {
    fn into_entries(self) -> Vec<TaskUpdateEntry> {
        let mut entries = self.updates;
        if let Some(task_id) = self.task_id {
            entries.push(TaskUpdateEntry {
                task_id,
                changes: self.changes.unwrap_or_default(),
            });
        }
        entries
    }
}

/// Process-scoped chat state for one panel
pub struct ChatSession {
    coordinator: StreamCoordinator,
    undo: UndoStack,
    store: Box<dyn TaskStore>,
    transport: Arc<dyn ModelTransport>,
    notifier: Arc<dyn Notifier>,
    bus: Arc<EventBus>,
    transcript: ConversationTranscript,
    agent_id: Option<String>,
    task_context: Option<TaskReference>,
    active_turn: Option<ActiveTurn>,
    last_error: Option<StreamFailure>,
}

impl ChatSession {
    /// Build a session from config
    pub fn new(
        config: &Config,
        store: Box<dyn TaskStore>,
        transport: Arc<dyn ModelTransport>,
    ) -> Result<Self, CitationError> {
        debug!("ChatSession::new: called");
        let renderer = CitationRenderer::new(&config.citation.chip_template)?;
        let registry: Arc<dyn ResultRegistry> = Arc::new(StructuredTypes::from_config(&config.structured));
        let transcript = if config.debug.log_conversations {
            ConversationTranscript::enabled(&config.debug.expanded_conversations_dir())
        } else {
            ConversationTranscript::disabled()
        };

        Ok(Self {
            coordinator: StreamCoordinator::new(renderer, registry),
            undo: UndoStack::with_limit(config.undo.max_entries),
            store,
            transport,
            notifier: Arc::new(TracingNotifier),
            bus: Arc::new(EventBus::with_default_capacity()),
            transcript,
            agent_id: None,
            task_context: None,
            active_turn: None,
            last_error: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn ResultRegistry>) -> Self {
        let renderer = self.coordinator.renderer().clone();
        self.coordinator = StreamCoordinator::new(renderer, registry);
        self
    }

    // === Accessors ===

    pub fn history(&self) -> &ConversationHistory {
        self.coordinator.history()
    }

    pub fn coordinator(&self) -> &StreamCoordinator {
        &self.coordinator
    }

    pub fn usage_totals(&self) -> TokenUsage {
        self.coordinator.usage_totals()
    }

    pub fn is_streaming(&self) -> bool {
        self.coordinator.is_streaming()
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn task_context(&self) -> Option<&TaskReference> {
        self.task_context.as_ref()
    }

    /// Most recent turn failure, kept for the UI to show next to the input
    pub fn last_error(&self) -> Option<&StreamFailure> {
        self.last_error.as_ref()
    }

    pub fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn TaskStore {
        self.store.as_mut()
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChatEvent> {
        self.bus.subscribe()
    }

    /// Task snapshot for the mention composer
    pub fn task_snapshot(&self) -> Vec<TaskReference> {
        self.store.all_tasks_with_hierarchy()
    }

    // === Requests ===

    /// Dispatch an inbound UI event
    pub fn handle_request(&mut self, request: ChatRequest) -> Result<(), SessionError> {
        debug!(request_type = request.request_type(), "ChatSession::handle_request: called");
        match request {
            ChatRequest::SelectAgent { agent_id, task_context } => {
                self.select_agent(&agent_id, task_context);
                Ok(())
            }
            ChatRequest::Retry { message_id } => self.retry_current_agent(&message_id).map(|_| ()),
            ChatRequest::SendMessage {
                content,
                referenced_tasks,
            } => self
                .send_message(MessagePayload::new(content).with_tasks(referenced_tasks))
                .map(|_| ()),
        }
    }

    /// Bind the chat to an agent, clearing the conversation
    pub fn select_agent(&mut self, agent_id: &str, task_context: Option<TaskReference>) {
        info!(%agent_id, task = ?task_context.as_ref().map(|t| &t.id), "Agent selected");
        self.abort_turn();
        self.coordinator.clear();
        self.last_error = None;
        self.bus.emit(ChatEvent::HistoryCleared);

        self.agent_id = Some(agent_id.to_string());
        self.task_context = task_context.clone();
        self.transcript.set_agent(agent_id);
        self.bus.emit(ChatEvent::AgentSelected {
            agent_id: agent_id.to_string(),
            task_context,
        });
    }

    /// Append a user message and start streaming the reply
    ///
    /// Returns the id of the streaming assistant message. Must be called from
    /// within a tokio runtime.
    pub fn send_message(&mut self, payload: MessagePayload) -> Result<MessageId, SessionError> {
        debug!(text_len = payload.text.len(), refs = payload.referenced_tasks.len(), "ChatSession::send_message: called");
        if self.agent_id.is_none() {
            return Err(SessionError::NoAgentSelected);
        }
        if payload.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.abort_turn();
        self.push_user_message(payload.text, MessageMeta::with_tasks(payload.referenced_tasks));
        Ok(self.start_turn())
    }

    /// Regenerate from `message_id`
    ///
    /// The history is truncated to the messages before it. A user message is
    /// re-sent as-is; for an assistant message the preceding user turn is
    /// streamed again.
    pub fn retry_current_agent(&mut self, message_id: &MessageId) -> Result<MessageId, SessionError> {
        debug!(%message_id, "ChatSession::retry_current_agent: called");
        if self.agent_id.is_none() {
            return Err(SessionError::NoAgentSelected);
        }
        let index = self
            .history()
            .index_of(message_id)
            .ok_or_else(|| SessionError::MessageNotFound(message_id.clone()))?;
        let messages = self.history().messages();
        let target = messages[index].clone();
        let replays_user_turn = match target.role {
            Role::User => true,
            Role::Assistant => index > 0 && messages[index - 1].role == Role::User,
        };
        if !replays_user_turn {
            return Err(SessionError::NothingToRetry(message_id.clone()));
        }

        self.bus.emit(ChatEvent::RetryRequested {
            message_id: message_id.clone(),
        });
        self.abort_turn();
        self.truncate_before(index);

        if target.role == Role::User {
            let meta = MessageMeta {
                input_bubble: target.input_bubble,
                referenced_tasks: target.referenced_tasks,
            };
            self.push_user_message(target.content, meta);
        }
        info!(%message_id, retained = self.history().len(), "Retrying turn");
        Ok(self.start_turn())
    }

    /// Keep `[0, index - 1]`
    fn truncate_before(&mut self, index: usize) {
        let history = self.coordinator.history_mut();
        if index == 0 {
            history.clear();
        } else {
            history.remove_messages_after(index - 1);
        }
        let retained = history.len();
        self.bus.emit(ChatEvent::HistoryTruncated { retained });
    }

    fn push_user_message(&mut self, content: String, meta: MessageMeta) -> MessageId {
        let referenced_tasks = meta.referenced_tasks.clone();
        let id = self.coordinator.history_mut().add_message(Role::User, content.clone(), meta);
        self.transcript.log_user_message(id.as_str(), &content);
        self.bus.emit(ChatEvent::MessageSent {
            message_id: id.clone(),
            content,
            referenced_tasks,
        });
        id
    }

    /// Start streaming a reply to the current history
    fn start_turn(&mut self) -> MessageId {
        let request = TransportRequest {
            agent_id: self.agent_id.clone().unwrap_or_default(),
            turns: self.coordinator.history().turns_with(expand_referenced_tasks),
        };
        let message_id = self.coordinator.start_streaming();
        self.last_error = None;
        self.bus.emit(ChatEvent::StreamStarted {
            message_id: message_id.clone(),
        });

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let transport = self.transport.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = transport.stream(request, tx.clone()).await {
                // Receiver may already be gone
                let _ = tx.send(StreamEvent::Error(e)).await;
            }
        });

        self.active_turn = Some(ActiveTurn {
            message_id: message_id.clone(),
            rx,
            handle,
        });
        message_id
    }

    /// Stop the in-flight turn, if any, keeping partial content
    fn abort_turn(&mut self) {
        if let Some(turn) = self.active_turn.take() {
            debug!(message_id = %turn.message_id, "ChatSession::abort_turn: aborting transport task");
            turn.handle.abort();
        }
        if let Some((message_id, removed)) = self.coordinator.abort_streaming()
            && removed
        {
            self.bus.emit(ChatEvent::MessageRemoved { message_id });
        }
    }

    // === Stream pumping ===

    /// Receive and apply the next event of the active turn
    ///
    /// Returns false once the turn has reached a terminal state (or there
    /// was no active turn).
    pub async fn pump(&mut self) -> bool {
        let Some(turn) = self.active_turn.as_mut() else {
            return false;
        };
        let message_id = turn.message_id.clone();
        let next = turn.rx.recv().await;
        match next {
            Some(event) => {
                self.apply_stream_event(&message_id, event);
            }
            None => {
                if self.coordinator.is_current(&message_id) {
                    warn!(%message_id, "Stream closed without a terminal event");
                    self.handle_failure(TransportError::network("Stream closed without a finish event"));
                }
                self.active_turn = None;
            }
        }
        self.active_turn.is_some()
    }

    /// Drive the active turn until it finishes or fails
    pub async fn run_turn(&mut self) -> Option<TurnOutcome> {
        let message_id = self.active_turn.as_ref()?.message_id.clone();
        while self.pump().await {}

        if let Some(failure) = &self.last_error
            && failure.message_id == message_id
        {
            return Some(TurnOutcome::Failed(failure.clone()));
        }
        Some(TurnOutcome::Finished(message_id))
    }

    /// Apply one transport event tagged with the turn's message id
    ///
    /// Events for any message other than the one in flight are stale and
    /// dropped.
    pub fn apply_stream_event(&mut self, message_id: &MessageId, event: StreamEvent) {
        if !self.coordinator.is_current(message_id) {
            debug!(%message_id, "ChatSession::apply_stream_event: stale event dropped");
            return;
        }
        match event {
            StreamEvent::Chunk { text } => {
                self.coordinator.append_text(&text);
            }
            StreamEvent::ToolCall { id, name, args } => {
                self.transcript.log_tool_call(&id, &name, &args.to_string());
                self.coordinator.record_tool_call(&id, &name, args);
            }
            StreamEvent::ToolResult { id, result } => {
                self.transcript.log_tool_result(&id, &result);
                self.coordinator.record_tool_result(&id, &result);
            }
            StreamEvent::Finish { usage } => {
                if let Some(id) = self.coordinator.finish_streaming(usage) {
                    let is_structured = self.history().get(&id).is_some_and(|m| m.is_structured);
                    if let Some(message) = self.history().get(&id) {
                        let content = message.content.clone();
                        self.transcript.log_assistant_message(id.as_str(), &content);
                    }
                    self.bus.emit(ChatEvent::StreamFinished {
                        message_id: id,
                        is_structured,
                        usage,
                    });
                }
                self.active_turn = None;
            }
            StreamEvent::Error(error) => {
                self.handle_failure(error);
                self.active_turn = None;
            }
        }
    }

    fn handle_failure(&mut self, error: TransportError) {
        let Some(failure) = self.coordinator.fail_streaming(error) else {
            return;
        };
        self.notifier.notify(failure.category.user_message(), Severity::Error);
        self.transcript
            .log_error(&failure.category.to_string(), &failure.error.message);
        if failure.removed {
            self.bus.emit(ChatEvent::MessageRemoved {
                message_id: failure.message_id.clone(),
            });
        }
        self.bus.emit(ChatEvent::StreamFailed {
            message_id: failure.message_id.clone(),
            category: failure.category,
            error: failure.error.to_string(),
            removed: failure.removed,
        });
        self.last_error = Some(failure);
    }

    // === Citations ===

    /// Resolve a clicked citation chip and navigate to its task
    ///
    /// On a miss the user is notified and nothing navigates.
    pub fn open_citation(&mut self, hierarchy_id: Option<&str>, name_hint: Option<&str>) -> Option<TaskReference> {
        debug!(?hierarchy_id, ?name_hint, "ChatSession::open_citation: called");
        let tasks = self.store.all_tasks_with_hierarchy();
        match resolve_citation(hierarchy_id, name_hint, &tasks) {
            Some(task) => {
                info!(task_id = %task.id, hierarchy_id = %task.hierarchy_id, "Navigating to cited task");
                self.bus.emit(ChatEvent::NavigateToTask {
                    task_id: task.id.clone(),
                    hierarchy_id: task.hierarchy_id.clone(),
                });
                Some(task.clone())
            }
            None => {
                self.notifier.notify(TASK_NOT_FOUND_NOTICE, Severity::Warning);
                None
            }
        }
    }

    // === Task mutations ===

    /// Patch a task through the undo stack
    pub fn apply_task_update(&mut self, task_id: &str, patch: &TaskPatch) -> Result<(), SessionError> {
        self.check_parent_change(task_id, patch, &HashMap::new())?;
        if apply_task_update(self.store.as_mut(), &mut self.undo, task_id, patch) {
            Ok(())
        } else {
            Err(SessionError::TaskNotFound(task_id.to_string()))
        }
    }

    /// Apply a `task_update` result carried by a structured message
    ///
    /// Every referenced task must exist before anything is changed. Returns
    /// the number of tasks updated.
    pub fn apply_structured_result(&mut self, message_id: &MessageId) -> Result<usize, SessionError> {
        debug!(%message_id, "ChatSession::apply_structured_result: called");
        let message: &Message = self
            .history()
            .get(message_id)
            .ok_or_else(|| SessionError::MessageNotFound(message_id.clone()))?;
        if message.applied {
            return Err(SessionError::AlreadyApplied(message_id.clone()));
        }
        let Some(data) = message.structured_data.clone().filter(|_| message.is_structured) else {
            return Err(SessionError::NotStructured(message_id.clone()));
        };
        let result_type = message.structured_type().unwrap_or_default().to_string();
        if result_type != TASK_UPDATE_TYPE {
            return Err(SessionError::UnsupportedResultType(result_type));
        }

        let result: TaskUpdateResult =
            serde_json::from_value(data).map_err(|e| SessionError::InvalidResult(e.to_string()))?;
        let entries = result.into_entries();
        if entries.is_empty() {
            return Err(SessionError::InvalidResult("no updates".to_string()));
        }
        if let Some(missing) = entries.iter().find(|e| self.store.get_task(&e.task_id).is_none()) {
            return Err(SessionError::TaskNotFound(missing.task_id.clone()));
        }
        let mut pending: HashMap<&str, Option<String>> = HashMap::new();
        for entry in &entries {
            self.check_parent_change(&entry.task_id, &entry.changes, &pending)?;
            if let Some(parent) = &entry.changes.parent {
                pending.insert(entry.task_id.as_str(), parent.clone());
            }
        }

        for entry in &entries {
            self.apply_task_update(&entry.task_id, &entry.changes)?;
        }

        if let Some(message) = self.coordinator.history_mut().get_mut(message_id) {
            message.applied = true;
        }
        self.coordinator.rerender(
            message_id,
            &ApplyOptions {
                can_apply: false,
                message_id: Some(message_id.clone()),
            },
        );
        info!(%message_id, count = entries.len(), "Structured result applied");
        Ok(entries.len())
    }

    /// Reject a patch whose new parent would put the task inside its own subtree
    ///
    /// `pending` holds parent changes from earlier entries of the same batch.
    fn check_parent_change(
        &self,
        task_id: &str,
        patch: &TaskPatch,
        pending: &HashMap<&str, Option<String>>,
    ) -> Result<(), SessionError> {
        let Some(Some(parent)) = &patch.parent else {
            return Ok(());
        };
        let parent_of = |id: &str| match pending.get(id) {
            Some(parent) => parent.clone(),
            None => self.store.get_task(id).and_then(|fields| fields.parent),
        };
        if closes_parent_cycle(task_id, parent, parent_of) {
            warn!(%task_id, %parent, "Rejecting parent change that would loop the task tree");
            return Err(SessionError::ParentCycle {
                task: task_id.to_string(),
                parent: parent.clone(),
            });
        }
        Ok(())
    }

    /// Undo the most recent assistant change
    pub fn undo(&mut self) -> bool {
        let task_id = self.undo.peek_undo().map(|s| s.task_id.clone());
        let applied = self.undo.undo(self.store.as_mut());
        if applied && let Some(task_id) = task_id {
            self.bus.emit(ChatEvent::UndoApplied { task_id });
        }
        applied
    }

    /// Redo the most recently undone change
    pub fn redo(&mut self) -> bool {
        let task_id = self.undo.peek_redo().map(|s| s.task_id.clone());
        let applied = self.undo.redo(self.store.as_mut());
        if applied && let Some(task_id) = task_id {
            self.bus.emit(ChatEvent::RedoApplied { task_id });
        }
        applied
    }

    // === Lifecycle ===

    /// Drop the conversation but keep the agent binding
    pub fn clear(&mut self) {
        debug!("ChatSession::clear: called");
        self.abort_turn();
        self.coordinator.clear();
        self.last_error = None;
        self.bus.emit(ChatEvent::HistoryCleared);
    }

    /// Back to a fresh session: no agent, no history, no undo, zero usage
    pub fn reset(&mut self) {
        debug!("ChatSession::reset: called");
        self.abort_turn();
        self.coordinator.reset();
        self.undo.clear_history();
        self.agent_id = None;
        self.task_context = None;
        self.last_error = None;
        self.bus.emit(ChatEvent::HistoryCleared);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(turn) = self.active_turn.take() {
            turn.handle.abort();
        }
    }
}

/// Message text as sent to the model, with mentioned tasks spelled out
fn expand_referenced_tasks(message: &Message) -> String {
    if message.referenced_tasks.is_empty() {
        return message.content.clone();
    }
    let mut content = message.content.clone();
    content.push_str("\n\nReferenced tasks:");
    for task in &message.referenced_tasks {
        content.push_str(&format!("\n- [#{}] {} (id: {})", task.hierarchy_id, task.text, task.id));
    }
    content
}
