//! Human-facing run log
//!
//! Keeps the timestamped progress lines (`YYYY-MM-DD HH:MM:SS - message`)
//! written to the log file at the end of a run. Every line is mirrored to
//! `tracing` at the matching level.

use chrono::Local;
use std::sync::Mutex;
use tracing::{info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run log shared by the fetch, merge and output steps
#[derive(Debug, Default)]
pub struct RunLog {
    lines: Mutex<Vec<String>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.push(message);
    }

    /// Move all lines of `other` to the end of this log, timestamps kept
    pub fn append(&self, other: RunLog) {
        let lines = other
            .lines
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(lines);
    }

    /// Snapshot of all lines so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, message: String) {
        let entry = format!("{} - {}", Local::now().format(TIMESTAMP_FORMAT), message);
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}
