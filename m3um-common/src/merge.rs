//! Merge Coordinator
//!
//! Runs Parser → Normalizer → Filters → Resolver over every source, in
//! source order, and assembles the final record sequence plus one status
//! per source.
//!
//! **Failure handling:**
//! - A source whose fetch failed contributes nothing and gets a `Failed`
//!   status; the run goes on with the next source
//! - A record that cannot be normalized is dropped; the source goes on
//! - A source with zero records is `Merged { found: 0, .. }`, not a failure
//! - Only an empty source list is an error ([`Error::NoSources`])

use crate::error::{Error, Result};
use crate::filters::RecordFilter;
use crate::identity::{IdentityResolver, Resolution, SeenSet};
use crate::normalizer::{Normalizer, SourceContext, DEFAULT_FALLBACK_GROUP};
use crate::parser::RecordParser;
use crate::record::NormalizedRecord;
use crate::render;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Text-fetch result supplied by the fetch collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched {
        text: String,
        /// Effective base for relative references (e.g. final URL after redirects)
        base_locator: Option<String>,
    },
    Failed {
        reason: String,
    },
}

/// One configured source and what fetching it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInput {
    /// Configured URL or path
    pub source_id: String,
    pub outcome: FetchOutcome,
}

impl SourceInput {
    pub fn fetched(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: FetchOutcome::Fetched {
                text: text.into(),
                base_locator: None,
            },
        }
    }

    pub fn fetched_with_base(
        source_id: impl Into<String>,
        text: impl Into<String>,
        base_locator: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: FetchOutcome::Fetched {
                text: text.into(),
                base_locator: Some(base_locator.into()),
            },
        }
    }

    pub fn failed(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            outcome: FetchOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// Per-source outcome of a merge run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Merged {
        /// Records parsed from the source
        found: usize,
        /// Records accepted into the output
        added: usize,
        /// Records rejected as duplicates of earlier ones
        duplicates: usize,
        /// Metadata lines or records dropped as malformed
        malformed: usize,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub source_id: String,
    /// Group label applied to the source's records (absent for failed sources)
    pub group: Option<String>,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

impl SourceStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Failed { .. })
    }

    pub fn added(&self) -> usize {
        match self.outcome {
            SourceOutcome::Merged { added, .. } => added,
            SourceOutcome::Failed { .. } => 0,
        }
    }
}

/// Final record sequence plus per-source statuses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub records: Vec<NormalizedRecord>,
    pub sources: Vec<SourceStatus>,
}

impl MergeResult {
    pub fn total_added(&self) -> usize {
        self.records.len()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceStatus> {
        self.sources.iter().filter(|status| status.is_failed())
    }

    /// Output playlist lines, header first
    pub fn playlist_lines(&self) -> Vec<String> {
        render::playlist_lines(&self.records)
    }

    /// Output playlist text (lines joined with `\n`)
    pub fn render(&self) -> String {
        self.playlist_lines().join("\n")
    }
}

/// Run-wide merge options
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Group label for sources whose id yields none
    pub fallback_group: String,
    /// Player user-agent to inject as a playback directive
    pub player_user_agent: Option<String>,
    /// Additional auth-like query parameter names for identity keys
    pub extra_auth_params: Vec<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            fallback_group: DEFAULT_FALLBACK_GROUP.to_string(),
            player_user_agent: None,
            extra_auth_params: Vec::new(),
        }
    }
}

/// Merge Coordinator
///
/// Sources are processed strictly sequentially: the seen-set is consulted
/// and updated per record, so the order of `sources` decides which copy of
/// a duplicated entry survives.
pub struct MergeCoordinator {
    fallback_group: String,
    normalizer: Normalizer,
    resolver: IdentityResolver,
    filters: Vec<Box<dyn RecordFilter>>,
}

impl Default for MergeCoordinator {
    fn default() -> Self {
        Self::new(MergeOptions::default())
    }
}

impl MergeCoordinator {
    pub fn new(options: MergeOptions) -> Self {
        let normalizer = match options.player_user_agent {
            Some(user_agent) => Normalizer::with_user_agent(user_agent),
            None => Normalizer::new(),
        };

        Self {
            fallback_group: options.fallback_group,
            normalizer,
            resolver: IdentityResolver::with_extra_auth_params(&options.extra_auth_params),
            filters: Vec::new(),
        }
    }

    /// Register a post-normalization filter (applied in registration order)
    pub fn with_filter(mut self, filter: Box<dyn RecordFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    /// Merge all sources into one deduplicated record sequence
    ///
    /// **Errors:** [`Error::NoSources`] when `sources` is empty. Nothing
    /// else aborts the run.
    pub fn merge(&self, sources: &[SourceInput]) -> Result<MergeResult> {
        if sources.is_empty() {
            return Err(Error::NoSources);
        }

        let mut seen = SeenSet::new();
        let mut records = Vec::new();
        let mut statuses = Vec::with_capacity(sources.len());

        for source in sources {
            let status = self.merge_source(source, &mut seen, &mut records);
            statuses.push(status);
        }

        info!(
            sources = statuses.len(),
            records = records.len(),
            unique_keys = seen.len(),
            "Merge complete"
        );

        Ok(MergeResult {
            records,
            sources: statuses,
        })
    }

    /// Process one source, appending accepted records to `output`
    fn merge_source(
        &self,
        source: &SourceInput,
        seen: &mut SeenSet,
        output: &mut Vec<NormalizedRecord>,
    ) -> SourceStatus {
        let (text, base_locator) = match &source.outcome {
            FetchOutcome::Fetched { text, base_locator } => (text, base_locator.as_deref()),
            FetchOutcome::Failed { reason } => {
                warn!(source = %source.source_id, reason = %reason, "Source unavailable, skipping");
                return SourceStatus {
                    source_id: source.source_id.clone(),
                    group: None,
                    outcome: SourceOutcome::Failed {
                        reason: reason.clone(),
                    },
                };
            }
        };

        let context = SourceContext::derive(&source.source_id, base_locator, &self.fallback_group);
        let parser = RecordParser::new(text);
        let mut records = parser.records();

        let mut found = 0;
        let mut added = 0;
        let mut duplicates = 0;
        let mut rejected = 0;

        for raw in records.by_ref() {
            found += 1;

            let mut record = match self.normalizer.normalize(&raw, &context) {
                Ok(record) => record,
                Err(e) => {
                    rejected += 1;
                    warn!(source = %source.source_id, error = %e, "Dropping record");
                    continue;
                }
            };

            for filter in &self.filters {
                filter.apply(&mut record);
            }

            match self.resolver.resolve(&record, seen) {
                Resolution::Accepted(key) => {
                    debug!(key = %key, "Accepted record");
                    added += 1;
                    output.push(record);
                }
                Resolution::Duplicate(key) => {
                    debug!(key = %key, source = %source.source_id, "Duplicate record rejected");
                    duplicates += 1;
                }
            }
        }

        let malformed = records.malformed() + rejected;

        info!(
            source = %source.source_id,
            group = %context.group,
            found,
            added,
            duplicates,
            malformed,
            degraded = records.degraded(),
            "Source merged"
        );

        SourceStatus {
            source_id: source.source_id.clone(),
            group: Some(context.group),
            outcome: SourceOutcome::Merged {
                found,
                added,
                duplicates,
                malformed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::TokenAppender;

    #[test]
    fn test_empty_source_list_is_error() {
        let coordinator = MergeCoordinator::default();
        assert!(matches!(coordinator.merge(&[]), Err(Error::NoSources)));
    }

    #[test]
    fn test_unparsable_source_is_not_failure() {
        let coordinator = MergeCoordinator::default();
        let result = coordinator
            .merge(&[SourceInput::fetched("http://h/empty.m3u", "#EXTM3U\n# nothing here\n")])
            .unwrap();

        assert!(result.records.is_empty());
        assert_eq!(
            result.sources[0].outcome,
            SourceOutcome::Merged {
                found: 0,
                added: 0,
                duplicates: 0,
                malformed: 0
            }
        );
        assert_eq!(result.sources[0].group.as_deref(), Some("empty"));
    }

    #[test]
    fn test_counts_duplicates_and_malformed() {
        let coordinator = MergeCoordinator::default();
        let text = "#EXTINF:-1 tvg-id=\"a\",A\nhttp://x/1\n#EXTINF:-1 tvg-id=\"A\",A again\nhttp://x/9\n#EXTINF:-1,orphan\n";
        let result = coordinator.merge(&[SourceInput::fetched("src.m3u", text)]).unwrap();

        assert_eq!(
            result.sources[0].outcome,
            SourceOutcome::Merged {
                found: 2,
                added: 1,
                duplicates: 1,
                malformed: 1
            }
        );
    }

    #[test]
    fn test_unresolvable_reference_dropped_and_source_continues() {
        let coordinator = MergeCoordinator::default();
        let text = "#EXTINF:-1,Bad\n//[bad/x\n#EXTINF:-1,Good\nhttp://x/ok";
        let result = coordinator
            .merge(&[SourceInput::fetched("http://h/a.m3u", text)])
            .unwrap();

        let references: Vec<&str> = result.records.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(references, vec!["http://x/ok"]);
        assert_eq!(
            result.sources[0].outcome,
            SourceOutcome::Merged {
                found: 2,
                added: 1,
                duplicates: 0,
                malformed: 1
            }
        );
    }

    #[test]
    fn test_user_agent_option_applied() {
        let coordinator = MergeCoordinator::new(MergeOptions {
            player_user_agent: Some("Player/2".to_string()),
            ..MergeOptions::default()
        });
        let result = coordinator
            .merge(&[SourceInput::fetched("s.m3u", "#EXTINF:-1,A\nhttp://x/1")])
            .unwrap();

        assert_eq!(
            result.records[0].aux_lines,
            vec!["#EXTVLCOPT:http-user-agent=Player/2".to_string()]
        );
    }

    #[test]
    fn test_filters_run_before_dedup() {
        let coordinator = MergeCoordinator::default()
            .with_filter(Box::new(TokenAppender::with_default_patterns().unwrap()));
        assert_eq!(coordinator.filter_names(), vec!["token-appender"]);

        let text = "#EXTINF:-1,A\n#EXTHTTP:{\"cookie\":\"__hdnea__=abc\"}\nhttp://x/1\n#EXTINF:-1,B\nhttp://x/1\n";
        let result = coordinator.merge(&[SourceInput::fetched("s.m3u", text)]).unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].reference, "http://x/1?__hdnea__=abc");
    }

    #[test]
    fn test_status_serialization() {
        let status = SourceStatus {
            source_id: "s".to_string(),
            group: None,
            outcome: SourceOutcome::Failed {
                reason: "HTTP 404".to_string(),
            },
        };
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "HTTP 404");
        assert_eq!(json["source_id"], "s");
    }
}
