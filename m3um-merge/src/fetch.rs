//! Source fetching
//!
//! Obtains the raw text of every configured source:
//! - `http://` / `https://` sources via one shared `reqwest` client
//! - anything else as a local file
//!
//! All sources are fetched concurrently; results come back in configured
//! order so the merge stays deterministic. A failure never aborts the
//! batch, it becomes a [`FetchOutcome::Failed`] for that source.
//!
//! Run log lines are buffered per source and flushed in source order, so
//! each status line follows the `Fetching` line of its own source.

use crate::config::FetchConfig;
use crate::run_log::RunLog;
use futures::future::join_all;
use m3um_common::{FetchOutcome, SourceInput};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Fetch errors, reported per source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid fetch configuration: {0}")]
    Config(String),
}

/// Text of one source plus the base for its relative references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub text: String,
    pub base_locator: Option<String>,
}

/// True for sources fetched over HTTP(S)
pub fn is_remote(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Source fetcher
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Build the shared HTTP client (user-agent, `Accept` header, timeout)
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let accept = HeaderValue::from_str(&config.accept)
            .map_err(|e| FetchError::Config(format!("accept header {:?}: {}", config.accept, e)))?;
        headers.insert(ACCEPT, accept);

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self { client })
    }

    /// Fetch every source concurrently, preserving order
    pub async fn fetch_all(&self, sources: &[String], log: &RunLog) -> Vec<SourceInput> {
        let total = sources.len();
        let fetches = sources
            .iter()
            .enumerate()
            .map(|(idx, source)| self.fetch_logged(idx + 1, total, source));

        join_all(fetches)
            .await
            .into_iter()
            .map(|(input, buffer)| {
                log.append(buffer);
                input
            })
            .collect()
    }

    async fn fetch_logged(&self, position: usize, total: usize, source: &str) -> (SourceInput, RunLog) {
        let log = RunLog::new();
        log.info(format!("Fetching ({}/{}) {}", position, total, source));

        let outcome = match self.fetch(source, &log).await {
            Ok(fetched) => FetchOutcome::Fetched {
                text: fetched.text,
                base_locator: fetched.base_locator,
            },
            Err(e) => {
                log.warn(format!("Error fetching {}: {}", source, e));
                FetchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let input = SourceInput {
            source_id: source.to_string(),
            outcome,
        };
        (input, log)
    }

    /// Fetch one source
    pub async fn fetch(&self, source: &str, log: &RunLog) -> Result<Fetched, FetchError> {
        let source = source.trim();
        if is_remote(source) {
            self.fetch_remote(source, log).await
        } else if let Some(path) = file_url_path(source) {
            fetch_local(&path, log).await
        } else {
            fetch_local(Path::new(source), log).await
        }
    }

    async fn fetch_remote(&self, source: &str, log: &RunLog) -> Result<Fetched, FetchError> {
        let response = self.client.get(source).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();

        if let Err(e) = check_status(status) {
            log.info(format!("Status: {} (len=N/A)", status.as_u16()));
            return Err(e);
        }

        let text = response.text().await?;
        log.info(format!("Status: {} (len={})", status.as_u16(), text.len()));
        if final_url != source {
            tracing::debug!(source, final_url = %final_url, "Source redirected");
        }

        Ok(Fetched {
            text,
            base_locator: Some(final_url),
        })
    }
}

/// Only `200 OK` carries a playlist
fn check_status(status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(FetchError::Status(status.as_u16()))
    }
}

/// Local path of a `file://` source
fn file_url_path(source: &str) -> Option<PathBuf> {
    Url::parse(source)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
}

/// Read a local playlist; its base is the `file://` URL of the canonical path
async fn fetch_local(path: &Path, log: &RunLog) -> Result<Fetched, FetchError> {
    let io_error = |source: std::io::Error| FetchError::Io {
        path: path.display().to_string(),
        source,
    };

    let text = tokio::fs::read_to_string(path).await.map_err(io_error)?;
    log.info(format!("Loaded local file (len={})", text.len()));
    let base_locator = tokio::fs::canonicalize(path)
        .await
        .ok()
        .and_then(|absolute| Url::from_file_path(absolute).ok())
        .map(|url| url.to_string());

    Ok(Fetched { text, base_locator })
}
