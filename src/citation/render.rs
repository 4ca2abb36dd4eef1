//! Citation chip rendering over markdown
//!
//! Chip HTML cannot be embedded before the markdown pass: block-level parsing
//! of list items and headings breaks around raw inline HTML. So rendering runs
//! in two passes. Markers are first swapped for inert placeholder words,
//! markdown is converted, and only then are the placeholders replaced with
//! chip markup.

use handlebars::Handlebars;
use pulldown_cmark::{Options, Parser, html};
use serde::Serialize;
use tracing::{debug, warn};

use super::CitationError;
use super::extract::{Citation, extract_citations};

/// Default chip template (values are HTML-escaped by Handlebars)
pub const DEFAULT_CHIP_TEMPLATE: &str = r#"<span class="task-citation" data-hierarchy-id="{{hierarchy_id}}"{{#if name_hint}} data-name-hint="{{name_hint}}"{{/if}} role="button" tabindex="0">#{{hierarchy_id}}{{#if name_hint}} {{name_hint}}{{/if}}</span>"#;

const CHIP_TEMPLATE_NAME: &str = "chip";

/// Placeholder word for the n-th citation
///
/// Letters and digits only, so no markdown rule can touch it, and the `END`
/// suffix keeps `GPCITE1END` from being a prefix of `GPCITE10END`.
fn placeholder(index: usize) -> String {
    format!("GPCITE{}END", index)
}

/// Output of a markdown render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub html: String,
    pub citations: Vec<Citation>,
}

#[derive(Serialize)]
struct ChipContext<'a> {
    hierarchy_id: &'a str,
    name_hint: Option<&'a str>,
}

/// Renders assistant markdown with interactive citation chips
#[derive(Debug, Clone)]
pub struct CitationRenderer {
    templates: Handlebars<'static>,
}

impl CitationRenderer {
    /// Create a renderer with a custom chip template
    pub fn new(chip_template: &str) -> Result<Self, CitationError> {
        debug!("CitationRenderer::new: called");
        let mut templates = Handlebars::new();
        templates
            .register_template_string(CHIP_TEMPLATE_NAME, chip_template)
            .map_err(|e| CitationError::Template(e.to_string()))?;
        Ok(Self { templates })
    }

    /// Render one chip
    pub fn render_chip(&self, citation: &Citation) -> String {
        let ctx = ChipContext {
            hierarchy_id: &citation.hierarchy_id,
            name_hint: citation.name_hint.as_deref(),
        };
        match self.templates.render(CHIP_TEMPLATE_NAME, &ctx) {
            Ok(chip) => chip,
            Err(e) => {
                warn!(error = %e, "Chip template failed, rendering marker as text");
                handlebars::html_escape(&citation.raw)
            }
        }
    }

    /// Convert markdown with citation markers into HTML with chips
    pub fn render_markdown(&self, text: &str) -> RenderedContent {
        let citations = extract_citations(text);
        debug!(citations = citations.len(), "CitationRenderer::render_markdown: called");

        // Pass 1: markers -> placeholders
        let mut substituted = String::with_capacity(text.len());
        let mut cursor = 0;
        for (i, citation) in citations.iter().enumerate() {
            substituted.push_str(&text[cursor..citation.offset]);
            substituted.push_str(&placeholder(i));
            cursor = citation.offset + citation.raw.len();
        }
        substituted.push_str(&text[cursor..]);

        let mut html = markdown_to_html(&substituted);

        // Pass 2: placeholders -> chips
        for (i, citation) in citations.iter().enumerate() {
            html = html.replace(&placeholder(i), &self.render_chip(citation));
        }

        RenderedContent { html, citations }
    }
}

impl Default for CitationRenderer {
    fn default() -> Self {
        let mut templates = Handlebars::new();
        // The built-in template is a compile-time constant known to parse
        let _ = templates.register_template_string(CHIP_TEMPLATE_NAME, DEFAULT_CHIP_TEMPLATE);
        Self { templates }
    }
}

/// Plain markdown to HTML conversion
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
