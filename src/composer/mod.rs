//! Mention token composer
//!
//! The chat input is an inline editor in which task mentions are atomic
//! tokens living between runs of text. [`SegmentBuffer`] is the pure content
//! model; [`MentionComposer`] layers the trigger-character search popup and
//! task selection on top of it.

mod segments;
mod state;

pub use segments::{Segment, SegmentBuffer, TOKEN_PLACEHOLDER, Unit};
pub use state::{ComposerKey, ComposerState, KeyOutcome, MentionComposer, MessagePayload, SearchState};
