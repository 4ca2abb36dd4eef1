//! Mention composer state machine
//!
//! `Idle -> Searching -> (commit | Escape) -> Idle`. A trigger character
//! preceded by whitespace (or at the very start of the content) opens a task
//! search; the query is whatever sits between the marker and the caret.

use serde::Serialize;
use tracing::{debug, info};

use super::segments::{Segment, SegmentBuffer, Unit};
use crate::config::ComposerConfig;
use crate::domain::TaskReference;
use crate::resolver::search_candidates;

/// Keys the composer reacts to; plain characters go through
/// [`MentionComposer::type_text`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerKey {
    Up,
    Down,
    Enter,
    Escape,
    Backspace,
    Left,
    Right,
    Home,
    End,
}

/// Result of a key press
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// The composer consumed the key
    Handled,

    /// The key means nothing here; the host may handle it
    Ignored,

    /// Enter on a non-empty composer: send this and start over
    Submit(MessagePayload),
}

/// Popup state while a search is open
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    /// Offset of the trigger character
    pub anchor: usize,

    /// Text typed after the trigger, up to the caret
    pub query: String,

    /// Index into `candidates`
    pub highlighted: usize,

    pub candidates: Vec<TaskReference>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ComposerState {
    #[default]
    Idle,
    Searching(SearchState),
}

/// What gets sent when the user submits
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MessagePayload {
    /// Plain text; tokens contribute nothing
    pub text: String,

    /// Mentioned tasks in selection order
    pub referenced_tasks: Vec<TaskReference>,
}

impl MessagePayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            referenced_tasks: Vec::new(),
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskReference>) -> Self {
        self.referenced_tasks = tasks;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.referenced_tasks.is_empty()
    }
}

/// Inline editor content with task tokens and a search popup
#[derive(Debug, Clone)]
pub struct MentionComposer {
    buffer: SegmentBuffer,
    caret: usize,
    state: ComposerState,
    selected_tasks: Vec<TaskReference>,
    tasks: Vec<TaskReference>,
    trigger: char,
    max_candidates: usize,
    dismissed_anchor: Option<usize>,
}

impl Default for MentionComposer {
    fn default() -> Self {
        Self::from_config(&ComposerConfig::default())
    }
}

impl MentionComposer {
    pub fn new(trigger: char, max_candidates: usize) -> Self {
        Self {
            buffer: SegmentBuffer::new(),
            caret: 0,
            state: ComposerState::Idle,
            selected_tasks: Vec::new(),
            tasks: Vec::new(),
            trigger,
            max_candidates: max_candidates.max(1),
            dismissed_anchor: None,
        }
    }

    pub fn from_config(config: &ComposerConfig) -> Self {
        Self::new(config.trigger, config.max_candidates)
    }

    /// Replace the task list searched by the popup
    pub fn set_task_snapshot(&mut self, tasks: Vec<TaskReference>) {
        debug!(count = tasks.len(), "MentionComposer::set_task_snapshot: called");
        self.tasks = tasks;
        if self.is_searching() {
            self.refresh_search();
        }
    }

    pub fn state(&self) -> &ComposerState {
        &self.state
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.state, ComposerState::Searching(_))
    }

    pub fn search(&self) -> Option<&SearchState> {
        match &self.state {
            ComposerState::Searching(search) => Some(search),
            ComposerState::Idle => None,
        }
    }

    pub fn candidates(&self) -> &[TaskReference] {
        self.search().map(|s| s.candidates.as_slice()).unwrap_or(&[])
    }

    pub fn selected_tasks(&self) -> &[TaskReference] {
        &self.selected_tasks
    }

    pub fn segments(&self) -> &[Segment] {
        self.buffer.segments()
    }

    pub fn display_text(&self) -> String {
        self.buffer.display_text()
    }

    pub fn plain_text(&self) -> String {
        self.buffer.plain_text()
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Insert typed text at the caret
    pub fn type_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let width = text.chars().count();
        self.buffer.insert_text(self.caret, text);
        self.shift_for_insert(self.caret, width);
        self.caret += width;
        self.refresh_search();
    }

    /// Move the caret (clamped to the content)
    pub fn set_caret(&mut self, offset: usize) {
        self.caret = offset.min(self.buffer.len());
        self.refresh_search();
    }

    pub fn handle_key(&mut self, key: ComposerKey) -> KeyOutcome {
        debug!(?key, searching = self.is_searching(), "MentionComposer::handle_key: called");
        match key {
            ComposerKey::Left => {
                self.set_caret(self.caret.saturating_sub(1));
                KeyOutcome::Handled
            }
            ComposerKey::Right => {
                self.set_caret(self.caret + 1);
                KeyOutcome::Handled
            }
            ComposerKey::Home => {
                self.set_caret(0);
                KeyOutcome::Handled
            }
            ComposerKey::End => {
                self.set_caret(self.buffer.len());
                KeyOutcome::Handled
            }
            _ if self.is_searching() => self.handle_search_key(key),
            _ => self.handle_idle_key(key),
        }
    }

    fn handle_search_key(&mut self, key: ComposerKey) -> KeyOutcome {
        let Some(search) = self.search() else {
            return KeyOutcome::Ignored;
        };
        let anchor = search.anchor;
        let highlighted = search.highlighted;
        let count = search.candidates.len();
        let query_empty = search.query.is_empty();

        match key {
            ComposerKey::Down | ComposerKey::Up => {
                let next = match key {
                    ComposerKey::Down => (highlighted + 1).min(count.saturating_sub(1)),
                    _ => highlighted.saturating_sub(1),
                };
                if let ComposerState::Searching(search) = &mut self.state {
                    search.highlighted = next;
                }
                KeyOutcome::Handled
            }
            ComposerKey::Enter => {
                if count == 0 {
                    self.dismiss(anchor);
                } else {
                    self.select_candidate(highlighted);
                }
                KeyOutcome::Handled
            }
            ComposerKey::Escape => {
                self.dismiss(anchor);
                KeyOutcome::Handled
            }
            ComposerKey::Backspace => {
                if !query_empty {
                    self.delete_before_caret();
                } else if let Some(last) = self.selected_tasks.last().map(|t| t.id.clone()) {
                    // Popup stays open on the same marker
                    self.remove_token(&last);
                } else {
                    self.buffer.delete_range(anchor, anchor + 1);
                    self.shift_for_delete(anchor, 1);
                    self.state = ComposerState::Idle;
                }
                KeyOutcome::Handled
            }
            _ => KeyOutcome::Ignored,
        }
    }

    fn handle_idle_key(&mut self, key: ComposerKey) -> KeyOutcome {
        match key {
            ComposerKey::Enter => {
                let payload = self.build_payload();
                if payload.is_empty() {
                    return KeyOutcome::Ignored;
                }
                self.clear();
                KeyOutcome::Submit(payload)
            }
            ComposerKey::Backspace => {
                if self.caret == 0 {
                    return KeyOutcome::Ignored;
                }
                let token = match self.buffer.unit_before(self.caret) {
                    Some(Unit::Token(task)) => Some(task.id.clone()),
                    _ => None,
                };
                match token {
                    Some(id) => {
                        self.remove_token(&id);
                    }
                    None => self.delete_before_caret(),
                }
                KeyOutcome::Handled
            }
            _ => KeyOutcome::Ignored,
        }
    }

    /// Commit the candidate at `index` in place of marker and query
    pub fn select_candidate(&mut self, index: usize) -> bool {
        let Some(search) = self.search() else {
            return false;
        };
        let Some(task) = search.candidates.get(index).cloned() else {
            return false;
        };
        let anchor = search.anchor;
        info!(task_id = %task.id, hierarchy_id = %task.hierarchy_id, "Mention committed");

        let removed = self.caret.saturating_sub(anchor);
        self.buffer.delete_range(anchor, self.caret);
        self.shift_for_delete(anchor, removed);
        self.buffer.insert_token(anchor, task.clone());
        self.buffer.insert_text(anchor + 1, " ");
        self.shift_for_insert(anchor, 2);
        self.caret = anchor + 2;
        self.push_selected(task);
        self.dismissed_anchor = None;
        self.state = ComposerState::Idle;
        true
    }

    /// Insert a token at the caret from outside the popup
    ///
    /// Returns false if the task is already referenced.
    pub fn insert_reference(&mut self, task: TaskReference) -> bool {
        debug!(task_id = %task.id, "MentionComposer::insert_reference: called");
        if self.selected_tasks.iter().any(|t| t.id == task.id) {
            return false;
        }
        let at = self.caret;
        self.buffer.insert_token(at, task.clone());
        self.buffer.insert_text(at + 1, " ");
        self.shift_for_insert(at, 2);
        self.caret = at + 2;
        self.push_selected(task);
        self.refresh_search();
        true
    }

    /// Remove a token and deselect its task
    pub fn remove_token(&mut self, task_id: &str) -> bool {
        let Some((offset, removed)) = self.buffer.remove_token(task_id) else {
            return false;
        };
        self.shift_for_delete(offset, removed);
        self.selected_tasks.retain(|t| t.id != task_id);
        debug!(%task_id, remaining = self.selected_tasks.len(), "MentionComposer::remove_token: removed");
        self.refresh_search();
        true
    }

    /// Current content as a message payload
    pub fn build_payload(&self) -> MessagePayload {
        MessagePayload {
            text: self.buffer.plain_text().trim().to_string(),
            referenced_tasks: self.selected_tasks.clone(),
        }
    }

    pub fn clear(&mut self) {
        debug!("MentionComposer::clear: called");
        self.buffer.clear();
        self.caret = 0;
        self.state = ComposerState::Idle;
        self.selected_tasks.clear();
        self.dismissed_anchor = None;
    }

    fn push_selected(&mut self, task: TaskReference) {
        if !self.selected_tasks.iter().any(|t| t.id == task.id) {
            self.selected_tasks.push(task);
        }
    }

    fn dismiss(&mut self, anchor: usize) {
        debug!(anchor, "MentionComposer::dismiss: called");
        self.dismissed_anchor = Some(anchor);
        self.state = ComposerState::Idle;
    }

    fn delete_before_caret(&mut self) {
        if self.caret == 0 {
            return;
        }
        let at = self.caret - 1;
        for task in self.buffer.delete_range(at, self.caret) {
            self.selected_tasks.retain(|t| t.id != task.id);
        }
        self.shift_for_delete(at, 1);
        self.refresh_search();
    }

    fn shift_for_insert(&mut self, at: usize, width: usize) {
        if let Some(anchor) = self.dismissed_anchor
            && anchor >= at
        {
            self.dismissed_anchor = Some(anchor + width);
        }
    }

    /// Keep caret and dismissed marker in place after `at..at + width` went away
    fn shift_for_delete(&mut self, at: usize, width: usize) {
        let end = at + width;
        if self.caret >= end {
            self.caret -= width;
        } else if self.caret > at {
            self.caret = at;
        }
        self.dismissed_anchor = match self.dismissed_anchor {
            Some(anchor) if anchor >= end => Some(anchor - width),
            Some(anchor) if anchor >= at => None,
            other => other,
        };
    }

    /// Trigger marker governing the caret, with the query typed after it
    fn active_marker(&self) -> Option<(usize, String)> {
        let (run_start, run) = self.buffer.text_run_before(self.caret);
        let chars: Vec<char> = run.chars().collect();
        let index = chars.iter().enumerate().rev().find_map(|(i, &c)| {
            let opens = c == self.trigger
                && match i {
                    // A token right before the run counts as a word
                    0 => run_start == 0,
                    _ => chars[i - 1].is_whitespace(),
                };
            opens.then_some(i)
        })?;
        Some((run_start + index, chars[index + 1..].iter().collect()))
    }

    fn refresh_search(&mut self) {
        let Some((anchor, query)) = self.active_marker() else {
            self.state = ComposerState::Idle;
            return;
        };
        if self.dismissed_anchor == Some(anchor) || query.contains('\n') {
            self.state = ComposerState::Idle;
            return;
        }

        let exclude: Vec<String> = self.selected_tasks.iter().map(|t| t.id.clone()).collect();
        let candidates = search_candidates(&query, &self.tasks, &exclude, self.max_candidates);
        if candidates.is_empty() && query.ends_with(char::is_whitespace) {
            self.dismiss(anchor);
            return;
        }

        let highlighted = match &self.state {
            ComposerState::Searching(prev) if prev.anchor == anchor && prev.query == query => {
                prev.highlighted.min(candidates.len().saturating_sub(1))
            }
            _ => 0,
        };
        self.state = ComposerState::Searching(SearchState {
            anchor,
            query,
            highlighted,
            candidates,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks() -> Vec<TaskReference> {
        vec![
            TaskReference::new("a", "1", "Alpha planning"),
            TaskReference::new("b", "1.1", "Beta build"),
            TaskReference::new("c", "2", "Charlie launch"),
        ]
    }

    fn composer() -> MentionComposer {
        let mut composer = MentionComposer::default();
        composer.set_task_snapshot(tasks());
        composer
    }

    fn pick(composer: &mut MentionComposer, query: &str) {
        composer.type_text("@");
        composer.type_text(query);
        assert!(composer.is_searching(), "search should open for {query}");
        assert_eq!(composer.handle_key(ComposerKey::Enter), KeyOutcome::Handled);
    }

    fn selected_ids(composer: &MentionComposer) -> Vec<&str> {
        composer.selected_tasks().iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_trigger_at_start_opens_search() {
        let mut composer = composer();
        composer.type_text("@");
        let search = composer.search().unwrap();
        assert_eq!(search.anchor, 0);
        assert_eq!(search.query, "");
        assert_eq!(search.candidates.len(), 3);
    }

    #[test]
    fn test_trigger_inside_word_does_not_open() {
        let mut composer = composer();
        composer.type_text("mail me@x");
        assert!(!composer.is_searching());
    }

    #[test]
    fn test_typing_query_filters_candidates() {
        let mut composer = composer();
        composer.type_text("hi @be");
        let search = composer.search().unwrap();
        assert_eq!(search.anchor, 3);
        assert_eq!(search.query, "be");
        assert_eq!(search.candidates, vec![tasks()[1].clone()]);
    }

    #[test]
    fn test_query_matches_hierarchy_id() {
        let mut composer = composer();
        composer.type_text("@1.1");
        assert_eq!(composer.candidates(), &[tasks()[1].clone()]);
    }

    #[test]
    fn test_commit_replaces_marker_with_token_and_space() {
        let mut composer = composer();
        composer.type_text("ask ");
        pick(&mut composer, "char");

        assert!(!composer.is_searching());
        assert_eq!(composer.segments().len(), 3);
        assert_eq!(composer.segments()[1], Segment::Token(tasks()[2].clone()));
        assert_eq!(composer.segments()[2], Segment::Text(" ".to_string()));
        assert_eq!(composer.caret(), 6);
        assert_eq!(selected_ids(&composer), vec!["c"]);
    }

    #[test]
    fn test_select_two_then_remove_first() {
        let mut composer = composer();
        pick(&mut composer, "alpha");
        pick(&mut composer, "beta");
        composer.type_text("status?");

        let payload = composer.build_payload();
        assert_eq!(payload.text, "status?");
        let ids: Vec<&str> = payload.referenced_tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(composer.remove_token("a"));
        let payload = composer.build_payload();
        let ids: Vec<&str> = payload.referenced_tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(composer.tokens_in_order(), vec!["b"]);
    }

    #[test]
    fn test_clearing_query_closes_without_commit() {
        let mut composer = composer();
        composer.type_text("@abc");
        assert!(composer.is_searching());
        assert_eq!(composer.search().unwrap().query, "abc");

        for _ in 0..3 {
            composer.handle_key(ComposerKey::Backspace);
        }
        assert!(composer.is_searching());
        assert_eq!(composer.search().unwrap().query, "");

        composer.handle_key(ComposerKey::Backspace);
        assert!(!composer.is_searching());
        assert!(composer.is_empty());
        assert!(composer.selected_tasks().is_empty());
    }

    #[test]
    fn test_escape_suppresses_reopen_for_marker() {
        let mut composer = composer();
        composer.type_text("@al");
        assert_eq!(composer.handle_key(ComposerKey::Escape), KeyOutcome::Handled);
        assert!(!composer.is_searching());

        composer.type_text("p");
        assert!(!composer.is_searching());

        // A fresh marker opens again
        composer.type_text(" @");
        assert!(composer.is_searching());
        assert_eq!(composer.search().unwrap().anchor, 5);
    }

    #[test]
    fn test_dismissed_marker_tracks_edits_before_it() {
        let mut composer = composer();
        composer.type_text("x @al");
        composer.handle_key(ComposerKey::Escape);
        composer.set_caret(0);
        composer.type_text("yy");
        composer.handle_key(ComposerKey::End);
        assert!(!composer.is_searching());
    }

    #[test]
    fn test_highlight_moves_and_clamps() {
        let mut composer = composer();
        composer.type_text("@");
        composer.handle_key(ComposerKey::Up);
        assert_eq!(composer.search().unwrap().highlighted, 0);
        for _ in 0..5 {
            composer.handle_key(ComposerKey::Down);
        }
        assert_eq!(composer.search().unwrap().highlighted, 2);

        composer.handle_key(ComposerKey::Enter);
        assert_eq!(selected_ids(&composer), vec!["c"]);
    }

    #[test]
    fn test_selected_tasks_are_excluded_from_candidates() {
        let mut composer = composer();
        pick(&mut composer, "alpha");
        composer.type_text("@");
        let ids: Vec<&str> = composer.candidates().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_candidates_are_capped() {
        let mut composer = MentionComposer::new('@', 2);
        composer.set_task_snapshot(tasks());
        composer.type_text("@");
        assert_eq!(composer.candidates().len(), 2);
    }

    #[test]
    fn test_backspace_with_empty_query_removes_last_token() {
        let mut composer = composer();
        pick(&mut composer, "alpha");
        pick(&mut composer, "beta");
        composer.type_text("@");

        composer.handle_key(ComposerKey::Backspace);
        assert_eq!(selected_ids(&composer), vec!["a"]);
        let search = composer.search().expect("popup stays open");
        assert_eq!(search.query, "");
        assert_eq!(composer.display_text().chars().last(), Some('@'));
    }

    #[test]
    fn test_newline_closes_search() {
        let mut composer = composer();
        composer.type_text("@al");
        composer.type_text("\n");
        assert!(!composer.is_searching());
    }

    #[test]
    fn test_no_match_with_trailing_space_dismisses() {
        let mut composer = composer();
        composer.type_text("@zzz");
        assert!(composer.is_searching());
        assert!(composer.candidates().is_empty());

        composer.type_text(" ");
        assert!(!composer.is_searching());
        composer.type_text("more");
        assert!(!composer.is_searching());
    }

    #[test]
    fn test_enter_without_candidates_dismisses() {
        let mut composer = composer();
        composer.type_text("@zzz");
        assert_eq!(composer.handle_key(ComposerKey::Enter), KeyOutcome::Handled);
        assert!(!composer.is_searching());
        assert!(composer.selected_tasks().is_empty());
    }

    #[test]
    fn test_idle_backspace_removes_whole_token() {
        let mut composer = composer();
        composer.type_text("see ");
        composer.insert_reference(tasks()[0].clone());
        // Caret sits after the trailing space; step back onto the token
        composer.handle_key(ComposerKey::Left);
        composer.handle_key(ComposerKey::Backspace);

        assert!(composer.selected_tasks().is_empty());
        assert_eq!(composer.plain_text(), "see ");
        assert_eq!(composer.caret(), 4);
    }

    #[test]
    fn test_insert_reference_dedupes() {
        let mut composer = composer();
        assert!(composer.insert_reference(tasks()[0].clone()));
        assert!(!composer.insert_reference(tasks()[0].clone()));
        assert_eq!(composer.selected_tasks().len(), 1);
    }

    #[test]
    fn test_token_before_trigger_blocks_search() {
        let mut composer = composer();
        composer.insert_reference(tasks()[0].clone());
        composer.handle_key(ComposerKey::Left);
        composer.type_text("@");
        assert!(!composer.is_searching());
    }

    #[test]
    fn test_enter_submits_and_clears() {
        let mut composer = composer();
        pick(&mut composer, "alpha");
        composer.type_text(" how far along? ");

        let outcome = composer.handle_key(ComposerKey::Enter);
        let KeyOutcome::Submit(payload) = outcome else {
            panic!("expected submit, got {:?}", outcome);
        };
        assert_eq!(payload.text, "how far along?");
        assert_eq!(payload.referenced_tasks, vec![tasks()[0].clone()]);
        assert!(composer.is_empty());
        assert!(composer.selected_tasks().is_empty());
    }

    #[test]
    fn test_enter_on_empty_is_ignored() {
        let mut composer = composer();
        composer.type_text("   ");
        assert_eq!(composer.handle_key(ComposerKey::Enter), KeyOutcome::Ignored);
    }

    #[test]
    fn test_custom_trigger() {
        let mut composer = MentionComposer::new('#', 8);
        composer.set_task_snapshot(tasks());
        composer.type_text("@al");
        assert!(!composer.is_searching());
        composer.type_text(" #al");
        assert!(composer.is_searching());
    }

    impl MentionComposer {
        fn tokens_in_order(&self) -> Vec<&str> {
            self.buffer.tokens().map(|t| t.id.as_str()).collect()
        }
    }
}
