//! m3um-merge - Main entry point
//!
//! Merges several M3U playlists into one deduplicated playlist.
//!
//! Exit status is non-zero for configuration errors, an empty source list,
//! or output that cannot be written. Unreachable sources are only logged.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use m3um_merge::config::{self, CliOverrides, ConfigOrigin};
use m3um_merge::output;
use m3um_merge::run_log::RunLog;

/// Command-line arguments for m3um-merge
#[derive(Parser, Debug)]
#[command(name = "m3um-merge")]
#[command(about = "Merge M3U playlists into one deduplicated playlist")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "M3UM_CONFIG")]
    config: Option<PathBuf>,

    /// Playlist source, URL or local path (repeatable; replaces configured sources)
    #[arg(short, long = "source")]
    sources: Vec<String>,

    /// Merged playlist path
    #[arg(short, long, env = "M3UM_OUTPUT")]
    output: Option<PathBuf>,

    /// Run log path
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Group label for sources that yield none
    #[arg(long)]
    fallback_group: Option<String>,

    /// Add an http-user-agent playback directive to every record
    #[arg(long)]
    inject_user_agent: bool,

    /// User-agent for the injected directive (implies --inject-user-agent)
    #[arg(long)]
    player_user_agent: Option<String>,

    /// Append secret tokens found in record options to their references
    #[arg(long)]
    append_tokens: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl From<Args> for CliOverrides {
    fn from(args: Args) -> Self {
        Self {
            sources: args.sources,
            output: args.output,
            log_file: args.log_file,
            summary_json: args.summary_json,
            fallback_group: args.fallback_group,
            inject_user_agent: args.inject_user_agent,
            player_user_agent: args.player_user_agent,
            append_tokens: args.append_tokens,
            log_level: args.log_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is resolved before tracing so the configured level applies
    let config_path = config::resolve_config_path(args.config.as_deref());
    let (mut config, origin) =
        config::load_or_default(config_path.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(args.into());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Starting m3um-merge v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &origin {
        ConfigOrigin::File(path) => info!("Config: {}", path.display()),
        ConfigOrigin::Missing(path) => {
            warn!("Config file {} not found, using defaults", path.display())
        }
        ConfigOrigin::Defaults => warn!("No config file found, using defaults"),
    }
    info!("Sources: {}", config.sources.len());
    info!("Output: {}", config.output.display());

    let log = RunLog::new();
    let outcome = m3um_merge::run(&config, &log).await;

    if let Err(e) = &outcome {
        log.warn(format!("Run failed: {:#}", e));
    }
    if let Err(e) = output::write_run_log(&config.log_file, &log) {
        error!("{:#}", e);
    }

    let summary = outcome?;
    info!(
        "Done: {} records from {} sources ({} failed)",
        summary.records,
        summary.sources.len(),
        summary.failed_sources
    );
    Ok(())
}
