//! Model transport boundary
//!
//! The network side of a chat turn lives behind [`ModelTransport`]. A
//! transport receives the rendered conversation and pushes [`StreamEvent`]s
//! into a channel; the session applies them in receive order.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::error::TransportError;
use super::types::{StreamEvent, TransportRequest};

/// Streams one model turn
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Run one turn, pushing events to `tx`
    ///
    /// Implementations send zero or more chunk/tool events and then exactly
    /// one `Finish` or `Error`. Returning `Err` is equivalent to sending an
    /// `Error` event. A closed receiver means the turn was abandoned; stop
    /// quietly.
    async fn stream(&self, request: TransportRequest, tx: mpsc::Sender<StreamEvent>) -> Result<(), TransportError>;
}

/// Errors loading a recorded event script
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid event on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Replays recorded stream events
///
/// The script is JSONL, one [`StreamEvent`] per line. Each terminal event
/// (`finish` or `error`) ends a turn, so a multi-line script can serve
/// several consecutive turns. Every request is recorded for inspection.
#[derive(Debug)]
pub struct ScriptedTransport {
    turns: Vec<Vec<StreamEvent>>,
    next_turn: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
    chunk_delay: Option<Duration>,
}

impl ScriptedTransport {
    /// Build from already-split turns
    pub fn new(turns: Vec<Vec<StreamEvent>>) -> Self {
        debug!(turn_count = turns.len(), "ScriptedTransport::new: called");
        Self {
            turns,
            next_turn: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            chunk_delay: None,
        }
    }

    /// Parse a JSONL event script
    pub fn from_jsonl(script: &str) -> Result<Self, ScriptError> {
        let mut turns = Vec::new();
        let mut current = Vec::new();
        for (index, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let event: StreamEvent =
                serde_json::from_str(line).map_err(|source| ScriptError::Parse { line: index + 1, source })?;
            let terminal = event.is_terminal();
            current.push(event);
            if terminal {
                turns.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            // Trailing events without a terminal still replay as-is
            turns.push(current);
        }
        Ok(Self::new(turns))
    }

    /// Load a JSONL event script from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(&path)?;
        debug!(path = %path.as_ref().display(), "ScriptedTransport::load: read script");
        Self::from_jsonl(&content)
    }

    /// Pause between events, so tests can act while a turn is in flight
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of turns served so far
    pub fn call_count(&self) -> usize {
        self.next_turn.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn stream(&self, request: TransportRequest, tx: mpsc::Sender<StreamEvent>) -> Result<(), TransportError> {
        debug!(agent_id = %request.agent_id, turns = request.turns.len(), "ScriptedTransport::stream: called");
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let index = self.next_turn.fetch_add(1, Ordering::SeqCst);
        let Some(events) = self.turns.get(index) else {
            debug!(%index, "ScriptedTransport::stream: script exhausted");
            return Err(TransportError::new(None, "Scripted transport has no more turns"));
        };

        for event in events {
            if let Some(delay) = self.chunk_delay {
                tokio::time::sleep(delay).await;
            }
            if tx.send(event.clone()).await.is_err() {
                warn!("Stream receiver dropped, abandoning scripted turn");
                return Ok(());
            }
        }
        Ok(())
    }
}
