//! Citation marker scanning

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Bracketed hierarchy marker with an optional name hint
///
/// Accepts `[#1.2]`, `[#1.2 Name]`, `[#1.2: Name]`, `[#1.2 | Name]` and the
/// full-width `【#1.2 Name】` form some models emit.
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\[【]#(\d+(?:\.\d+)*)(?:[\s:：|]+([^\]】\n]*?))?\s*[\]】]").expect("citation regex is valid")
});

/// One citation found in assistant text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// Byte offset of the marker in the scanned text
    pub offset: usize,

    /// The marker exactly as it appeared
    pub raw: String,

    /// Hierarchy id inside the marker, e.g. `1.2`
    pub hierarchy_id: String,

    /// Optional task name after the id
    pub name_hint: Option<String>,
}

/// Scan text left to right for citation markers
pub fn extract_citations(text: &str) -> Vec<Citation> {
    CITATION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let hierarchy_id = caps.get(1)?.as_str().to_string();
            let name_hint = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty());
            Some(Citation {
                offset: whole.start(),
                raw: whole.as_str().to_string(),
                hierarchy_id,
                name_hint,
            })
        })
        .collect()
}

/// Parse a single marker such as `[#1.2 Design]`
///
/// Returns None unless the whole (trimmed) input is one marker.
pub fn parse_citation(marker: &str) -> Option<Citation> {
    let marker = marker.trim();
    let mut found = extract_citations(marker);
    if found.len() == 1 && found[0].raw.len() == marker.len() {
        found.pop()
    } else {
        None
    }
}
