//! m3um-merge - Playlist merge tool
//!
//! Fetches the configured M3U sources, merges them through the
//! [`m3um_common`] pipeline and writes:
//! - the merged playlist
//! - the run log
//! - optionally, a JSON run summary
//!
//! The binary in `main.rs` only resolves configuration and initializes
//! logging; everything else goes through [`run`].

pub mod config;
pub mod fetch;
pub mod output;
pub mod run_log;

use anyhow::{Context, Result};
use config::TomlConfig;
use fetch::Fetcher;
use m3um_common::merge::SourceOutcome;
use m3um_common::{MergeCoordinator, MergeResult};
use output::RunSummary;
use run_log::RunLog;

/// Fetch, merge and write one playlist
///
/// Source failures are logged and reported in the summary; they do not
/// fail the run. Errors are an empty source list, invalid configuration,
/// or output that cannot be written.
pub async fn run(config: &TomlConfig, log: &RunLog) -> Result<RunSummary> {
    let coordinator = build_coordinator(config)?;
    let fetcher = Fetcher::new(&config.fetch).context("Failed to build HTTP client")?;

    let inputs = fetcher.fetch_all(&config.sources, log).await;
    let result = coordinator.merge(&inputs)?;
    log_source_statuses(&result, log);

    output::write_playlist(&config.output, &result, &config.log_file, log)?;

    let summary = RunSummary::new(&result, &config.output);
    if let Some(path) = &config.summary_json {
        output::write_summary(path, &summary)?;
        log.info(format!("Wrote run summary to {}", path.display()));
    }

    Ok(summary)
}

/// Merge coordinator for the configured options and filters
pub fn build_coordinator(config: &TomlConfig) -> Result<MergeCoordinator> {
    let mut coordinator = MergeCoordinator::new(config.merge_options());
    if let Some(appender) = config.token_appender()? {
        coordinator = coordinator.with_filter(Box::new(appender));
    }
    Ok(coordinator)
}

fn log_source_statuses(result: &MergeResult, log: &RunLog) {
    for (idx, status) in result.sources.iter().enumerate() {
        match &status.outcome {
            SourceOutcome::Merged {
                found,
                added,
                duplicates,
                malformed,
            } => log.info(format!(
                "Source #{}: found {} entries, added {} (duplicates={}, malformed={})",
                idx + 1,
                found,
                added,
                duplicates,
                malformed
            )),
            SourceOutcome::Failed { reason } => {
                log.warn(format!("Source #{}: failed ({})", idx + 1, reason))
            }
        }
    }
    log.info(format!("Total merged entries: {}", result.total_added()));
}
