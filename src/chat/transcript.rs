//! Conversation transcripts for debugging
//!
//! When enabled via config (debug.log-conversations = true), every chat turn
//! is appended to a JSONL file under the configured conversations directory
//! (default `~/.ganttpilot/conversations/`).

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Entry in the transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub entry_type: EntryType,
    /// Agent the conversation is bound to
    pub agent: String,
}

/// Type of transcript entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EntryType {
    UserMessage { message_id: String, content: String },
    AssistantMessage { message_id: String, content: String },
    ToolCall { id: String, name: String, args: String },
    ToolResult { id: String, result: String },
    Error { category: String, message: String },
    SessionStart,
    SessionEnd,
}

/// Append-only JSONL transcript writer
pub struct ConversationTranscript {
    writer: Option<BufWriter<File>>,
    log_path: Option<PathBuf>,
    agent: String,
}

impl ConversationTranscript {
    /// A transcript that drops everything
    pub fn disabled() -> Self {
        Self {
            writer: None,
            log_path: None,
            agent: String::new(),
        }
    }

    /// Open a new timestamped transcript in `dir`
    ///
    /// Failure to create the file is logged and yields a disabled transcript.
    pub fn enabled(dir: &Path) -> Self {
        let mut transcript = Self::disabled();
        if let Err(e) = transcript.start_session(dir) {
            error!("Failed to start conversation transcript: {}", e);
        }
        transcript
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    fn start_session(&mut self, dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(dir)?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f");
        let log_path = dir.join(format!("conversation-{}.jsonl", timestamp));
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        self.writer = Some(BufWriter::new(file));
        self.log_path = Some(log_path.clone());
        debug!("Started conversation transcript at: {}", log_path.display());

        self.log_entry(EntryType::SessionStart);
        Ok(())
    }

    pub fn set_agent(&mut self, agent: &str) {
        self.agent = agent.to_string();
    }

    pub fn log_user_message(&mut self, message_id: &str, content: &str) {
        self.log_entry(EntryType::UserMessage {
            message_id: message_id.to_string(),
            content: content.to_string(),
        });
    }

    pub fn log_assistant_message(&mut self, message_id: &str, content: &str) {
        self.log_entry(EntryType::AssistantMessage {
            message_id: message_id.to_string(),
            content: content.to_string(),
        });
    }

    pub fn log_tool_call(&mut self, id: &str, name: &str, args: &str) {
        self.log_entry(EntryType::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args: args.to_string(),
        });
    }

    pub fn log_tool_result(&mut self, id: &str, result: &str) {
        self.log_entry(EntryType::ToolResult {
            id: id.to_string(),
            result: result.to_string(),
        });
    }

    pub fn log_error(&mut self, category: &str, message: &str) {
        self.log_entry(EntryType::Error {
            category: category.to_string(),
            message: message.to_string(),
        });
    }

    fn log_entry(&mut self, entry_type: EntryType) {
        let Some(writer) = &mut self.writer else {
            return;
        };

        let entry = TranscriptEntry {
            timestamp: Utc::now(),
            entry_type,
            agent: self.agent.clone(),
        };

        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(e) = writeln!(writer, "{}", json) {
                    warn!("Failed to write transcript entry: {}", e);
                }
                // Flush per entry so a crash keeps the tail
                if let Err(e) = writer.flush() {
                    warn!("Failed to flush transcript: {}", e);
                }
            }
            Err(e) => {
                warn!("Failed to serialize transcript entry: {}", e);
            }
        }
    }
}

impl Drop for ConversationTranscript {
    fn drop(&mut self) {
        if self.writer.is_some() {
            self.log_entry(EntryType::SessionEnd);
            if let Some(path) = &self.log_path {
                debug!("Conversation transcript saved to: {}", path.display());
            }
        }
    }
}

impl std::fmt::Debug for ConversationTranscript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationTranscript")
            .field("log_path", &self.log_path)
            .field("agent", &self.agent)
            .finish()
    }
}
