//! Segment model for the mention composer
//!
//! The editable surface is an ordered list of segments: runs of plain text
//! and atomic task tokens. All offsets are character offsets in which a
//! token counts as exactly one placeholder character; nothing ever looks
//! inside a token.

use tracing::debug;

use crate::domain::TaskReference;

/// Character a token occupies in [`SegmentBuffer::display_text`]
pub const TOKEN_PLACEHOLDER: char = '\u{FFFC}';

/// One unit of composer content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Token(TaskReference),
}

impl Segment {
    /// Offset width of this segment
    pub fn width(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Token(_) => 1,
        }
    }
}

/// What sits at a given offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit<'a> {
    Char(char),
    Token(&'a TaskReference),
}

/// Ordered text/token segments
///
/// Invariant after every mutation: no empty text segments and no two
/// adjacent text segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentBuffer {
    segments: Vec<Segment>,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Total width in offset units
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::width).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Plain text with tokens contributing nothing
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(text) => Some(text.as_str()),
                Segment::Token(_) => None,
            })
            .collect()
    }

    /// Text with one [`TOKEN_PLACEHOLDER`] per token (offsets line up)
    pub fn display_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Token(_) => out.push(TOKEN_PLACEHOLDER),
            }
        }
        out
    }

    /// Tokens in document order
    pub fn tokens(&self) -> impl Iterator<Item = &TaskReference> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Token(task) => Some(task),
            Segment::Text(_) => None,
        })
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Insert plain text at an offset (clamped to the end)
    pub fn insert_text(&mut self, offset: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let index = self.split_at(offset);
        self.segments.insert(index, Segment::Text(text.to_string()));
        self.normalize();
    }

    /// Insert a token at an offset (clamped to the end)
    pub fn insert_token(&mut self, offset: usize, task: TaskReference) {
        debug!(task_id = %task.id, offset, "SegmentBuffer::insert_token: called");
        let index = self.split_at(offset);
        self.segments.insert(index, Segment::Token(task));
        self.normalize();
    }

    /// Delete the units in `start..end`, returning any tokens removed
    pub fn delete_range(&mut self, start: usize, end: usize) -> Vec<TaskReference> {
        let len = self.len();
        let end = end.min(len);
        if start >= end {
            return Vec::new();
        }
        let first = self.split_at(start);
        let last = self.split_at(end);
        let removed: Vec<TaskReference> = self
            .segments
            .drain(first..last)
            .filter_map(|s| match s {
                Segment::Token(task) => Some(task),
                Segment::Text(_) => None,
            })
            .collect();
        self.normalize();
        removed
    }

    /// Remove the token for `task_id`, splicing the surrounding text
    ///
    /// The single space that follows a committed token is dropped along with
    /// it when the token sat at the start of the text or after whitespace, so
    /// no doubled or leading blank remains. Returns the token's offset and the
    /// number of units removed.
    pub fn remove_token(&mut self, task_id: &str) -> Option<(usize, usize)> {
        let mut offset = 0;
        let mut index = None;
        for (i, segment) in self.segments.iter().enumerate() {
            if let Segment::Token(task) = segment
                && task.id == task_id
            {
                index = Some(i);
                break;
            }
            offset += segment.width();
        }
        let index = index?;
        self.segments.remove(index);
        self.normalize();

        let mut removed = 1;
        let before_is_blank = offset == 0 || matches!(self.unit_before(offset), Some(Unit::Char(c)) if c.is_whitespace());
        if before_is_blank && self.unit_at(offset) == Some(Unit::Char(' ')) {
            self.delete_range(offset, offset + 1);
            removed += 1;
        }
        debug!(%task_id, offset, removed, "SegmentBuffer::remove_token: spliced");
        Some((offset, removed))
    }

    /// Unit starting at `offset`
    pub fn unit_at(&self, offset: usize) -> Option<Unit<'_>> {
        let mut pos = 0;
        for segment in &self.segments {
            let width = segment.width();
            if offset < pos + width {
                return match segment {
                    Segment::Text(text) => text.chars().nth(offset - pos).map(Unit::Char),
                    Segment::Token(task) => Some(Unit::Token(task)),
                };
            }
            pos += width;
        }
        None
    }

    /// Unit just before `offset`
    pub fn unit_before(&self, offset: usize) -> Option<Unit<'_>> {
        if offset == 0 {
            return None;
        }
        self.unit_at(offset - 1)
    }

    /// The text run that ends at `offset`
    ///
    /// Walks back from `offset` to the nearest token or the start of the
    /// content and returns the run's starting offset and its text.
    pub fn text_run_before(&self, offset: usize) -> (usize, String) {
        let mut pos = 0;
        let mut run_start = 0;
        let mut run = String::new();
        for segment in &self.segments {
            if pos >= offset {
                break;
            }
            match segment {
                Segment::Token(_) => {
                    pos += 1;
                    run_start = pos;
                    run.clear();
                }
                Segment::Text(text) => {
                    let take = (offset - pos).min(text.chars().count());
                    run.clear();
                    run.extend(text.chars().take(take));
                    run_start = pos;
                    pos += take;
                }
            }
        }
        (run_start, run)
    }

    /// Make `offset` a segment boundary and return the index of the segment
    /// that starts there
    fn split_at(&mut self, offset: usize) -> usize {
        let mut pos = 0;
        for i in 0..self.segments.len() {
            if offset <= pos {
                return i;
            }
            let width = self.segments[i].width();
            if offset < pos + width {
                if let Segment::Text(text) = &mut self.segments[i] {
                    let byte = text
                        .char_indices()
                        .nth(offset - pos)
                        .map(|(b, _)| b)
                        .unwrap_or(text.len());
                    let tail = text.split_off(byte);
                    self.segments.insert(i + 1, Segment::Text(tail));
                }
                return i + 1;
            }
            pos += width;
        }
        self.segments.len()
    }

    /// Drop empty text and merge adjacent text segments
    fn normalize(&mut self) {
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            match segment {
                Segment::Text(text) if text.is_empty() => {}
                Segment::Text(text) => match merged.last_mut() {
                    Some(Segment::Text(prev)) => prev.push_str(&text),
                    _ => merged.push(Segment::Text(text)),
                },
                token => merged.push(token),
            }
        }
        self.segments = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> TaskReference {
        TaskReference::new(id, id, format!("Task {}", id))
    }

    fn buffer_with(parts: &[&str]) -> SegmentBuffer {
        // "@x" entries become tokens for task x
        let mut buffer = SegmentBuffer::new();
        for part in parts {
            let end = buffer.len();
            match part.strip_prefix('@') {
                Some(id) => buffer.insert_token(end, task(id)),
                None => buffer.insert_text(end, part),
            }
        }
        buffer
    }

    #[test]
    fn test_token_counts_as_one_unit() {
        let buffer = buffer_with(&["ab", "@1", "cd"]);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.display_text(), format!("ab{}cd", TOKEN_PLACEHOLDER));
        assert_eq!(buffer.plain_text(), "abcd");
    }

    #[test]
    fn test_insert_text_inside_run_splits_and_merges() {
        let mut buffer = buffer_with(&["held"]);
        buffer.insert_text(2, "l");
        assert_eq!(buffer.segments(), &[Segment::Text("helld".to_string())]);
    }

    #[test]
    fn test_insert_token_mid_text() {
        let mut buffer = buffer_with(&["hello world"]);
        buffer.insert_token(6, task("7"));
        assert_eq!(buffer.segments().len(), 3);
        assert_eq!(buffer.unit_at(6), Some(Unit::Token(&task("7"))));
        assert_eq!(buffer.plain_text(), "hello world");
    }

    #[test]
    fn test_multibyte_offsets() {
        let mut buffer = buffer_with(&["日本語"]);
        buffer.insert_token(1, task("1"));
        assert_eq!(buffer.display_text(), format!("日{}本語", TOKEN_PLACEHOLDER));
        assert_eq!(buffer.unit_before(1), Some(Unit::Char('日')));
    }

    #[test]
    fn test_delete_range_returns_tokens() {
        let mut buffer = buffer_with(&["a ", "@1", " b ", "@2", " c"]);
        let removed = buffer.delete_range(1, 7);
        assert_eq!(removed, vec![task("1"), task("2")]);
        assert_eq!(buffer.display_text(), "a c");
        assert_eq!(buffer.segments().len(), 1);
    }

    #[test]
    fn test_remove_token_drops_trailing_space() {
        let mut buffer = buffer_with(&["ask ", "@1", " about it"]);
        let (offset, removed) = buffer.remove_token("1").unwrap();
        assert_eq!((offset, removed), (4, 2));
        assert_eq!(buffer.plain_text(), "ask about it");
        assert_eq!(buffer.segments().len(), 1);
    }

    #[test]
    fn test_remove_leading_token() {
        let mut buffer = buffer_with(&["@1", " hi"]);
        buffer.remove_token("1").unwrap();
        assert_eq!(buffer.plain_text(), "hi");
    }

    #[test]
    fn test_remove_token_keeps_space_after_word() {
        let mut buffer = buffer_with(&["x", "@1", " y"]);
        buffer.remove_token("1").unwrap();
        assert_eq!(buffer.plain_text(), "x y");
    }

    #[test]
    fn test_remove_missing_token() {
        let mut buffer = buffer_with(&["x"]);
        assert!(buffer.remove_token("9").is_none());
    }

    #[test]
    fn test_text_run_before_stops_at_token() {
        let buffer = buffer_with(&["one ", "@1", " two @q"]);
        let (start, run) = buffer.text_run_before(buffer.len());
        assert_eq!(start, 5);
        assert_eq!(run, " two @q");

        let (start, run) = buffer.text_run_before(3);
        assert_eq!(start, 0);
        assert_eq!(run, "one");
    }

    #[test]
    fn test_text_run_before_right_after_token() {
        let buffer = buffer_with(&["a", "@1"]);
        assert_eq!(buffer.text_run_before(2), (2, String::new()));
    }
}
