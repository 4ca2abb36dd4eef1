//! GanttPilot configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::citation::{CitationRenderer, DEFAULT_CHIP_TEMPLATE};
use crate::undo::DEFAULT_MAX_ENTRIES;

/// Main GanttPilot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mention composer behaviour
    pub composer: ComposerConfig,

    /// Undo/redo stack bounds
    pub undo: UndoConfig,

    /// Citation chip rendering
    pub citation: CitationConfig,

    /// Structured result types recognised in assistant output
    pub structured: StructuredConfig,

    /// Debugging aids
    pub debug: DebugConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.composer.trigger.is_whitespace() {
            return Err(eyre::eyre!("composer.trigger must not be whitespace"));
        }
        if self.composer.max_candidates == 0 {
            return Err(eyre::eyre!("composer.max-candidates must be at least 1"));
        }
        if self.undo.max_entries == 0 {
            return Err(eyre::eyre!("undo.max-entries must be at least 1"));
        }
        CitationRenderer::new(&self.citation.chip_template).context("citation.chip-template does not compile")?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .ganttpilot.yml
        let local_config = PathBuf::from(".ganttpilot.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/ganttpilot/ganttpilot.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ganttpilot").join("ganttpilot.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Mention composer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Character that opens the task search popup
    pub trigger: char,

    /// Maximum number of candidates shown in the popup
    #[serde(rename = "max-candidates")]
    pub max_candidates: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            trigger: '@',
            max_candidates: 8,
        }
    }
}

/// Undo/redo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Bound for each of the undo and redo stacks
    #[serde(rename = "max-entries")]
    pub max_entries: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Citation chip configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationConfig {
    /// Handlebars template for one chip; sees `hierarchy_id` and `name_hint`
    #[serde(rename = "chip-template")]
    pub chip_template: String,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            chip_template: DEFAULT_CHIP_TEMPLATE.to_string(),
        }
    }
}

/// Structured result configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredConfig {
    /// Registered `type` values for JSON results
    pub types: Vec<String>,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            types: vec![
                "task_split".to_string(),
                "task_update".to_string(),
                "schedule_plan".to_string(),
            ],
        }
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Write every conversation to a JSONL transcript
    #[serde(rename = "log-conversations")]
    pub log_conversations: bool,

    /// Transcript directory (`~/` is expanded)
    #[serde(rename = "conversations-dir")]
    pub conversations_dir: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_conversations: false,
            conversations_dir: "~/.ganttpilot/conversations".to_string(),
        }
    }
}

impl DebugConfig {
    /// Resolve the transcript directory
    pub fn expanded_conversations_dir(&self) -> PathBuf {
        match self.conversations_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(rest)),
            None => PathBuf::from(&self.conversations_dir),
        }
    }
}
