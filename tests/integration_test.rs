//! Integration tests for GanttPilot
//!
//! These tests drive a full chat session the way a host UI would: compose
//! with mentions, stream a reply, click citations, apply and undo.

use std::sync::Arc;
use std::time::Duration;

use ganttpilot::chat::{ChatSession, ScriptedTransport, StreamEvent, TokenUsage, TurnOutcome};
use ganttpilot::composer::{ComposerKey, KeyOutcome, MentionComposer};
use ganttpilot::config::Config;
use ganttpilot::domain::{Task, TaskFields};
use ganttpilot::events::ChatEvent;
use ganttpilot::notify::{RecordingNotifier, Severity};
use ganttpilot::store::{MemoryTaskStore, TaskStore};
use tempfile::TempDir;

fn task_store() -> MemoryTaskStore {
    MemoryTaskStore::from_tasks(vec![
        Task::new("design", TaskFields::named("Design review")),
        Task::new("api", TaskFields::named("Build API").with_parent("design")),
        Task::new("ui", TaskFields::named("Build UI").with_parent("design")),
        Task::new("launch", TaskFields::named("Launch")),
    ])
    .expect("valid task tree")
}

fn session_with(turns: Vec<Vec<StreamEvent>>) -> (ChatSession, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let transport = Arc::new(ScriptedTransport::new(turns).with_chunk_delay(Duration::from_millis(1)));
    let mut session = ChatSession::new(&Config::default(), Box::new(task_store()), transport)
        .expect("default config is valid")
        .with_notifier(notifier.clone());
    session.select_agent("planner", None);
    (session, notifier)
}

// =============================================================================
// Compose -> stream -> cite
// =============================================================================

#[tokio::test]
async fn test_mention_turn_with_citation_navigation() {
    let reply = vec![
        StreamEvent::chunk("[#1.1 Build API] is blocked by "),
        StreamEvent::chunk("[#1.2 Build UI]."),
        StreamEvent::finish(Some(TokenUsage::new(40, 12))),
    ];
    let (mut session, notifier) = session_with(vec![reply]);
    let mut events = session.subscribe();

    let mut composer = MentionComposer::from_config(&Config::default().composer);
    composer.set_task_snapshot(session.task_snapshot());
    composer.type_text("@build a");
    assert!(composer.is_searching());
    assert_eq!(composer.candidates()[0].id, "api");
    assert_eq!(composer.handle_key(ComposerKey::Enter), KeyOutcome::Handled);
    composer.type_text("why is this late?");

    let KeyOutcome::Submit(payload) = composer.handle_key(ComposerKey::Enter) else {
        panic!("expected submit");
    };
    assert!(composer.is_empty());
    assert_eq!(payload.referenced_tasks.len(), 1);
    assert_eq!(payload.referenced_tasks[0].hierarchy_id, "1.1");

    let assistant_id = session.send_message(payload).expect("send");
    let outcome = session.run_turn().await;
    assert_eq!(outcome, Some(TurnOutcome::Finished(assistant_id.clone())));

    let reply = session.history().get(&assistant_id).expect("assistant message");
    assert_eq!(reply.content, "[#1.1 Build API] is blocked by [#1.2 Build UI].");
    let html = reply.rendered_html.as_deref().expect("rendered");
    assert!(html.contains(r#"data-hierarchy-id="1.1""#));
    assert!(html.contains(r#"data-hierarchy-id="1.2""#));
    assert_eq!(session.usage_totals().total_tokens, 52);

    // Click the second chip
    let task = session.open_citation(Some("1.2"), Some("Build UI")).expect("resolved");
    assert_eq!(task.id, "ui");
    assert!(notifier.notices().is_empty());

    let mut saw_navigation = false;
    while let Ok(event) = events.try_recv() {
        if let ChatEvent::NavigateToTask { task_id, .. } = event {
            assert_eq!(task_id, "ui");
            saw_navigation = true;
        }
    }
    assert!(saw_navigation);
}

#[tokio::test]
async fn test_stale_citation_falls_back_to_name() {
    let (mut session, notifier) = session_with(vec![]);

    // "Launch" is #2; a stale id with the right name still resolves
    let task = session.open_citation(Some("7"), Some("Launch")).expect("resolved by name");
    assert_eq!(task.id, "launch");

    assert!(session.open_citation(Some("7"), Some("Deleted task")).is_none());
    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].1, Severity::Warning);
}

// =============================================================================
// Retry and failure
// =============================================================================

#[tokio::test]
async fn test_retry_after_failure() {
    let failing = vec![
        StreamEvent::chunk("partial answer"),
        StreamEvent::Error(ganttpilot::chat::TransportError::network("connection reset")),
    ];
    let good = vec![StreamEvent::chunk("full answer"), StreamEvent::finish(None)];
    let (mut session, notifier) = session_with(vec![failing, good]);

    let first = session
        .send_message(ganttpilot::composer::MessagePayload::new("plan the launch"))
        .expect("send");
    let Some(TurnOutcome::Failed(failure)) = session.run_turn().await else {
        panic!("expected failure");
    };
    assert!(!failure.removed);
    assert_eq!(session.history().get(&first).expect("kept").content, "partial answer");
    assert_eq!(notifier.notices()[0].1, Severity::Error);

    let retried = session.retry_current_agent(&first).expect("retry");
    session.run_turn().await;

    let contents: Vec<&str> = session.history().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["plan the launch", "full answer"]);
    assert_eq!(session.history().last().expect("last").id, retried);
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn test_new_message_while_streaming_keeps_single_stream() {
    let answer = || vec![StreamEvent::chunk("answer"), StreamEvent::finish(None)];
    let (mut session, _) = session_with(vec![answer(), answer()]);

    let first = session
        .send_message(ganttpilot::composer::MessagePayload::new("one"))
        .expect("send");
    let second = session
        .send_message(ganttpilot::composer::MessagePayload::new("two"))
        .expect("send");
    session.run_turn().await;

    // The interrupted reply never received a chunk, so it is gone
    assert!(session.history().get(&first).is_none_or(|m| !m.streaming));
    assert_eq!(session.history().get(&second).expect("second").content, "answer");
    assert!(!session.is_streaming());
    assert!(session.history().streaming_message().is_none());
}

// =============================================================================
// Structured results and undo
// =============================================================================

#[tokio::test]
async fn test_apply_update_then_undo_redo() {
    let update = r#"```json
{"type": "task_update", "task_id": "launch", "changes": {"progress": 0.25, "assignee": "sam"}}
```"#;
    let (mut session, _) = session_with(vec![vec![StreamEvent::chunk(update), StreamEvent::finish(None)]]);

    let id = session
        .send_message(ganttpilot::composer::MessagePayload::new("assign launch"))
        .expect("send");
    session.run_turn().await;
    assert_eq!(
        session.history().get(&id).and_then(|m| m.structured_type()),
        Some("task_update")
    );

    assert_eq!(session.apply_structured_result(&id).expect("apply"), 1);
    let launch = session.store().get_task("launch").expect("task");
    assert_eq!(launch.progress, 0.25);
    assert_eq!(launch.assignee.as_deref(), Some("sam"));

    assert!(session.undo());
    let launch = session.store().get_task("launch").expect("task");
    assert_eq!(launch.progress, 0.0);
    assert_eq!(launch.assignee, None);
    assert!(!session.undo());

    assert!(session.redo());
    assert_eq!(session.store().get_task("launch").expect("task").progress, 0.25);
}

// =============================================================================
// Config and transcripts
// =============================================================================

#[tokio::test]
async fn test_transcript_written_when_enabled() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = Config::default();
    config.debug.log_conversations = true;
    config.debug.conversations_dir = temp_dir.path().to_string_lossy().to_string();

    let transport = Arc::new(ScriptedTransport::new(vec![vec![
        StreamEvent::chunk("noted"),
        StreamEvent::finish(None),
    ]]));
    let mut session = ChatSession::new(&config, Box::new(task_store()), transport).expect("session");
    session.select_agent("planner", None);
    session
        .send_message(ganttpilot::composer::MessagePayload::new("remember this"))
        .expect("send");
    session.run_turn().await;
    drop(session);

    let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
        .expect("read dir")
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(entries.len(), 1);
    let content = std::fs::read_to_string(entries[0].path()).expect("read transcript");
    assert!(content.contains("remember this"));
    assert!(content.contains("noted"));
    assert!(content.contains("SessionEnd"));
}

#[test]
fn test_config_rejects_bad_template() {
    let mut config = Config::default();
    config.citation.chip_template = "{{#if}}".to_string();
    assert!(config.validate().is_err());
}
