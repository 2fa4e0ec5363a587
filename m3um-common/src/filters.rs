//! Post-normalization record filters
//!
//! Filters run after normalization and before identity resolution, in the
//! order they were registered with the coordinator.
//!
//! The built-in [`TokenAppender`] looks for secret tokens embedded in a
//! record's directive lines (for example a `__hdnea__` cookie inside an
//! `#EXTHTTP:` header block) and carries them over onto the reference query.

use crate::error::{Error, Result};
use crate::record::NormalizedRecord;
use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;
use url::{form_urlencoded, Url};

/// Default `__hdnea__` cookie pattern
pub const HDNEA_PATTERN: &str = r#"__hdnea__=([^"&;\s]+)"#;

/// Enrichment step applied to every normalized record
pub trait RecordFilter: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    fn apply(&self, record: &mut NormalizedRecord);
}

/// Query parameter to fill from the first capture group of `regex`
#[derive(Debug, Clone)]
pub struct TokenPattern {
    pub param: String,
    pub regex: Regex,
}

impl TokenPattern {
    /// Compile a pattern
    ///
    /// **Errors:** [`Error::Config`] if the parameter name is blank, the
    /// regex is invalid, or it has no capture group.
    pub fn new(param: &str, pattern: &str) -> Result<Self> {
        let param = param.trim();
        if param.is_empty() {
            return Err(Error::Config("token pattern parameter name is empty".to_string()));
        }

        let regex = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid token pattern {:?}: {}", pattern, e)))?;
        if regex.captures_len() < 2 {
            return Err(Error::Config(format!(
                "token pattern {:?} needs a capture group for the token value",
                pattern
            )));
        }

        Ok(Self {
            param: param.to_string(),
            regex,
        })
    }
}

/// Appends tokens found in directive lines to the record reference
#[derive(Debug, Clone, Default)]
pub struct TokenAppender {
    patterns: Vec<TokenPattern>,
}

impl TokenAppender {
    pub fn new(patterns: Vec<TokenPattern>) -> Self {
        Self { patterns }
    }

    /// Appender with the built-in `__hdnea__` pattern
    pub fn with_default_patterns() -> Result<Self> {
        Ok(Self::new(vec![TokenPattern::new("__hdnea__", HDNEA_PATTERN)?]))
    }

    pub fn patterns(&self) -> &[TokenPattern] {
        &self.patterns
    }

    /// Tokens found in the record's directive lines
    ///
    /// Patterns are tried in order and matches are taken in line order.
    /// When the same parameter matches more than once, the last match wins;
    /// parameters keep the position of their first match.
    pub fn detect(&self, record: &NormalizedRecord) -> Vec<(String, String)> {
        let mut found: IndexMap<String, String> = IndexMap::new();

        for pattern in &self.patterns {
            for line in &record.aux_lines {
                for captures in pattern.regex.captures_iter(line) {
                    if let Some(value) = captures.get(1).map(|m| m.as_str()).filter(|v| !v.is_empty()) {
                        found.insert(pattern.param.clone(), value.to_string());
                    }
                }
            }
        }

        found.into_iter().collect()
    }
}

impl RecordFilter for TokenAppender {
    fn name(&self) -> &str {
        "token-appender"
    }

    fn apply(&self, record: &mut NormalizedRecord) {
        let tokens = self.detect(record);
        if tokens.is_empty() {
            return;
        }

        let mut url = match Url::parse(&record.reference) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => {
                debug!(reference = %record.reference, "Token found but reference is not a URL");
                return;
            }
        };

        // Segments without a token keep their original encoding
        let mut segments: Vec<String> = url
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|segment| !segment.is_empty())
            .filter(|segment| {
                let key = query_key(segment);
                !tokens.iter().any(|(param, _)| *param == key)
            })
            .map(str::to_string)
            .collect();

        segments.extend(
            tokens
                .iter()
                .map(|(param, value)| format!("{}={}", form_encode(param), form_encode(value))),
        );
        url.set_query(Some(&segments.join("&")));

        debug!(
            reference = %url,
            tokens = tokens.len(),
            "Appended tokens to reference"
        );
        record.reference = url.to_string();
    }
}

/// Decoded key of one raw `key=value` query segment
fn query_key(segment: &str) -> String {
    let raw = segment.split('=').next().unwrap_or_default();
    form_urlencoded::parse(raw.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn form_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
