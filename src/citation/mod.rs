//! Task citations in assistant output
//!
//! The model cites tasks with bracketed hierarchy markers such as
//! `[#1.2 Design review]`. This module finds them ([`extract_citations`]) and
//! turns them into clickable chips inside the markdown-rendered HTML
//! ([`CitationRenderer`]). Resolving a clicked chip back to a task lives in
//! [`crate::resolver`].

mod extract;
mod render;

pub use extract::{Citation, extract_citations, parse_citation};
pub use render::{CitationRenderer, DEFAULT_CHIP_TEMPLATE, RenderedContent, markdown_to_html};

use thiserror::Error;

/// Errors from citation rendering setup
#[derive(Debug, Error)]
pub enum CitationError {
    #[error("Invalid chip template: {0}")]
    Template(String),
}
