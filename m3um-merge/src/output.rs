//! Output writing
//!
//! Writes the artifacts of a run:
//! - merged playlist (with a note line when nothing was merged)
//! - run log
//! - optional JSON run summary

use crate::run_log::RunLog;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use m3um_common::{MergeResult, SourceStatus};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Machine-readable summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub output: PathBuf,
    /// Records written to the playlist
    pub records: usize,
    pub failed_sources: usize,
    pub sources: Vec<SourceStatus>,
}

impl RunSummary {
    pub fn new(result: &MergeResult, output: &Path) -> Self {
        Self {
            generated_at: Utc::now(),
            output: output.to_path_buf(),
            records: result.total_added(),
            failed_sources: result.failed_sources().count(),
            sources: result.sources.clone(),
        }
    }
}

/// Comment line appended when no record was merged
pub fn no_channels_note(log_file: &Path) -> String {
    format!(
        "# NOTE: No channels merged. Check {} for fetch errors.",
        log_file.display()
    )
}

/// Playlist lines for a merge result
pub fn playlist_lines(result: &MergeResult, log_file: &Path, log: &RunLog) -> Vec<String> {
    let mut lines = result.playlist_lines();
    if result.records.is_empty() {
        lines.push(no_channels_note(log_file));
        log.warn("No channels merged; wrote note to output file.");
    }
    lines
}

/// Write the merged playlist, returning the number of lines written
pub fn write_playlist(path: &Path, result: &MergeResult, log_file: &Path, log: &RunLog) -> Result<usize> {
    let lines = playlist_lines(result, log_file, log);
    write_text(path, &lines.join("\n"))
        .with_context(|| format!("Failed to write playlist {}", path.display()))?;

    log.info(format!(
        "Wrote merged playlist to {} (lines={})",
        path.display(),
        lines.len()
    ));
    Ok(lines.len())
}

/// Write the run log lines collected so far
pub fn write_run_log(path: &Path, log: &RunLog) -> Result<()> {
    write_text(path, &log.lines().join("\n"))
        .with_context(|| format!("Failed to write run log {}", path.display()))
}

/// Write the run summary as pretty JSON
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    write_text(path, &json)
        .with_context(|| format!("Failed to write run summary {}", path.display()))
}

fn write_text(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}
