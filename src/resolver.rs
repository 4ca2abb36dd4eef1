//! Task reference resolution
//!
//! Maps a model-emitted citation (hierarchy id plus optional name hint) or a
//! typed query fragment onto tasks from a snapshot of the chart.
//!
//! Hierarchy ids are positional and shift when tasks are reordered or
//! inserted, so a citation can go stale between generation and click. The
//! name hint is the fallback: exact normalized match first, then forward
//! containment (shortest name wins), then reverse containment (longest name
//! wins, names shorter than four characters ignored).

use tracing::debug;

use crate::domain::TaskReference;

/// Characters removed from names before comparison
pub const STRIPPED_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '\'', '"', '`', '(', ')', '[', ']', '{', '}', '<', '>', '*', '_', '~', '#', '|',
    '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{3001}', '\u{3002}', '\u{FF0C}', '\u{FF1A}', '\u{FF1B}',
    '\u{FF01}', '\u{FF1F}', '\u{FF08}', '\u{FF09}', '\u{3010}', '\u{3011}', '\u{300A}', '\u{300B}',
];

/// Minimum normalized length for a reverse-containment candidate
const MIN_REVERSE_MATCH_CHARS: usize = 4;

/// Normalize a task name for comparison
///
/// Lowercases, strips [`STRIPPED_PUNCTUATION`] and collapses whitespace runs
/// into single spaces.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve a citation to one task, or None when nothing matches
pub fn resolve_citation<'a>(
    hierarchy_id: Option<&str>,
    name_hint: Option<&str>,
    tasks: &'a [TaskReference],
) -> Option<&'a TaskReference> {
    debug!(?hierarchy_id, ?name_hint, candidates = tasks.len(), "resolve_citation: called");

    if let Some(hid) = hierarchy_id.map(str::trim).filter(|h| !h.is_empty())
        && let Some(task) = tasks.iter().find(|t| t.hierarchy_id == hid)
    {
        debug!(task_id = %task.id, "resolve_citation: hierarchy id match");
        return Some(task);
    }

    let hint = normalize_name(name_hint?);
    if hint.is_empty() {
        debug!("resolve_citation: empty name hint after normalization");
        return None;
    }

    let normalized: Vec<(usize, String)> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (i, normalize_name(&t.text)))
        .collect();

    if let Some((i, _)) = normalized.iter().find(|(_, name)| *name == hint) {
        debug!(task_id = %tasks[*i].id, "resolve_citation: exact name match");
        return Some(&tasks[*i]);
    }

    // Forward containment: the candidate name contains the hint
    let forward: Vec<&(usize, String)> = normalized.iter().filter(|(_, name)| name.contains(&hint)).collect();
    if !forward.is_empty() {
        let best = pick(&forward, |a, b| a < b);
        debug!(task_id = %tasks[best].id, matches = forward.len(), "resolve_citation: forward containment");
        return Some(&tasks[best]);
    }

    // Reverse containment: the hint contains the candidate name
    let reverse: Vec<&(usize, String)> = normalized
        .iter()
        .filter(|(_, name)| name.chars().count() >= MIN_REVERSE_MATCH_CHARS && hint.contains(name.as_str()))
        .collect();
    if !reverse.is_empty() {
        let best = pick(&reverse, |a, b| a > b);
        debug!(task_id = %tasks[best].id, matches = reverse.len(), "resolve_citation: reverse containment");
        return Some(&tasks[best]);
    }

    debug!("resolve_citation: no match");
    None
}

/// Pick the candidate whose name length wins `better`; the first one wins ties
fn pick(candidates: &[&(usize, String)], better: impl Fn(usize, usize) -> bool) -> usize {
    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if better(candidate.1.chars().count(), best.1.chars().count()) {
            best = candidate;
        }
    }
    best.0
}

/// Lowercase and drop all whitespace, for typed queries
fn search_key(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect()
}

/// Find tasks matching a typed query fragment
///
/// Case- and whitespace-insensitive substring match against the task name and
/// hierarchy id. Tasks whose id is in `exclude` are skipped. An empty query
/// matches everything. Results keep snapshot order.
pub fn search_candidates(query: &str, tasks: &[TaskReference], exclude: &[String], limit: usize) -> Vec<TaskReference> {
    let key = search_key(query);
    debug!(%key, limit, "search_candidates: called");
    tasks
        .iter()
        .filter(|t| !exclude.iter().any(|id| *id == t.id))
        .filter(|t| key.is_empty() || search_key(&t.text).contains(&key) || search_key(&t.hierarchy_id).contains(&key))
        .take(limit)
        .cloned()
        .collect()
}
