//! User notices
//!
//! Toasts belong to the host UI. The chat core raises them through
//! [`Notifier`]; [`TracingNotifier`] is the headless default.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Shows a short notice to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Writes notices to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(notice = %message, "Notice"),
            Severity::Warning => warn!(notice = %message, "Notice"),
            Severity::Error => error!(notice = %message, "Notice"),
        }
    }
}

/// Keeps every notice in memory (tests, CLI summaries)
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(String, Severity)> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((message.to_string(), severity));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify("first", Severity::Info);
        notifier.notify("second", Severity::Error);
        assert_eq!(
            notifier.notices(),
            vec![
                ("first".to_string(), Severity::Info),
                ("second".to_string(), Severity::Error)
            ]
        );
    }

    #[test]
    fn test_tracing_notifier_does_not_panic() {
        TracingNotifier.notify("hello", Severity::Warning);
    }
}
