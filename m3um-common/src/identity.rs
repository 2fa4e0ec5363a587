//! Identity & Dedup Resolver
//!
//! Computes a canonical [`IdentityKey`] per normalized record and filters
//! duplicates against a [`SeenSet`] shared by every source of one run.
//!
//! **Key precedence:**
//! 1. Non-empty `tvg-id` attribute → `ById(lowercased id)`
//! 2. Otherwise the normalized reference → `ByReference(..)`
//!
//! **Reference normalization:**
//! - scheme and host lower-cased
//! - repeated `/` collapsed, trailing `/` stripped (root excepted)
//! - auth-like query parameters dropped, the rest sorted by key
//! - fragment dropped
//!
//! The resolver itself is stateless; the only mutable state is the
//! caller-owned seen-set, so results depend on processing order alone.

use crate::record::NormalizedRecord;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use url::Url;

/// Query parameter names treated as credentials (lowercase, exact match)
pub const AUTH_PARAM_NAMES: &[&str] = &[
    "token",
    "access_token",
    "auth",
    "sig",
    "signature",
    "hdnea",
    "__hdnea__",
    "hdntl",
    "expires",
    "exp",
    "hmac",
    "key",
    "api_key",
    "apikey",
    "session",
    "sessionid",
    "sid",
];

/// Canonical deduplication key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IdentityKey {
    /// Case-folded identifier attribute
    ById(String),
    /// Normalized reference
    ByReference(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::ById(id) => write!(f, "id:{}", id),
            IdentityKey::ByReference(reference) => write!(f, "ref:{}", reference),
        }
    }
}

/// Identity keys accepted so far in one merge run
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    keys: HashSet<IdentityKey>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.keys.contains(key)
    }

    /// Record a key; `false` if it was already present
    pub fn insert(&mut self, key: IdentityKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Outcome of resolving one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// First occurrence; the key is now in the seen-set
    Accepted(IdentityKey),
    /// Key already seen earlier in the run
    Duplicate(IdentityKey),
}

impl Resolution {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Resolution::Accepted(_))
    }

    pub fn key(&self) -> &IdentityKey {
        match self {
            Resolution::Accepted(key) | Resolution::Duplicate(key) => key,
        }
    }
}

/// Identity & Dedup Resolver
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    /// Lowercase query keys dropped from reference keys
    auth_params: BTreeSet<String>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self {
            auth_params: AUTH_PARAM_NAMES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl IdentityResolver {
    /// Resolver with the built-in auth parameter vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver whose auth vocabulary is the built-in one plus `extra`
    pub fn with_extra_auth_params<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolver = Self::default();
        resolver.auth_params.extend(
            extra
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty()),
        );
        resolver
    }

    pub fn is_auth_param(&self, name: &str) -> bool {
        self.auth_params.contains(&name.to_ascii_lowercase())
    }

    /// Canonical key of a record
    pub fn key_for(&self, record: &NormalizedRecord) -> IdentityKey {
        match record.identifier() {
            Some(id) => IdentityKey::ById(id.to_lowercase()),
            None => IdentityKey::ByReference(self.normalize_reference(&record.reference)),
        }
    }

    /// Accept the record if its key is new, reject it as a duplicate otherwise
    pub fn resolve(&self, record: &NormalizedRecord, seen: &mut SeenSet) -> Resolution {
        let key = self.key_for(record);
        if seen.insert(key.clone()) {
            Resolution::Accepted(key)
        } else {
            Resolution::Duplicate(key)
        }
    }

    /// Stable textual form of a reference for identity comparison
    pub fn normalize_reference(&self, reference: &str) -> String {
        let reference = reference.trim();
        match Url::parse(reference) {
            Ok(url) if !url.cannot_be_a_base() => self.normalize_url(&url),
            _ => {
                let without_fragment = reference.split('#').next().unwrap_or_default();
                collapse_path(without_fragment)
            }
        }
    }

    fn normalize_url(&self, url: &Url) -> String {
        let mut normalized = String::with_capacity(url.as_str().len());
        normalized.push_str(&url.scheme().to_ascii_lowercase());
        normalized.push(':');

        if let Some(host) = url.host_str() {
            normalized.push_str("//");
            if !url.username().is_empty() {
                normalized.push_str(url.username());
                if let Some(password) = url.password() {
                    normalized.push(':');
                    normalized.push_str(password);
                }
                normalized.push('@');
            }
            normalized.push_str(&host.to_ascii_lowercase());
            if let Some(port) = url.port() {
                normalized.push(':');
                normalized.push_str(&port.to_string());
            }
        }

        normalized.push_str(&collapse_path(url.path()));

        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| !self.is_auth_param(name))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));

        if !params.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            normalized.push('?');
            normalized.push_str(&query);
        }

        normalized
    }
}

/// Collapse runs of `/` and strip a trailing `/` unless the path is root
fn collapse_path(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_slash = false;

    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        collapsed.push(c);
    }

    if collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MetadataLine;

    fn record(reference: &str, id: Option<&str>) -> NormalizedRecord {
        let mut metadata = MetadataLine::with_title("T");
        if let Some(id) = id {
            metadata.attributes.set("tvg-id", id);
        }
        NormalizedRecord {
            source_id: "src".into(),
            metadata,
            aux_lines: vec![],
            reference: reference.into(),
        }
    }

    #[test]
    fn test_identifier_wins_over_reference() {
        let resolver = IdentityResolver::new();
        let key = resolver.key_for(&record("http://x/1", Some("  ABC.in ")));
        assert_eq!(key, IdentityKey::ById("abc.in".to_string()));
    }

    #[test]
    fn test_identifier_attribute_key_case_insensitive() {
        let resolver = IdentityResolver::new();
        let mut rec = record("http://x/1", None);
        rec.metadata.attributes.set("TVG-ID", "Chan");
        assert_eq!(resolver.key_for(&rec), IdentityKey::ById("chan".to_string()));
    }

    #[test]
    fn test_empty_identifier_falls_back_to_reference() {
        let resolver = IdentityResolver::new();
        let key = resolver.key_for(&record("http://x/1", Some("")));
        assert_eq!(key, IdentityKey::ByReference("http://x/1".to_string()));
    }

    #[test]
    fn test_scheme_and_host_lowercased() {
        let resolver = IdentityResolver::new();
        assert_eq!(
            resolver.normalize_reference("HTTP://Example.COM/Live/Stream"),
            "http://example.com/Live/Stream"
        );
        assert_eq!(
            resolver.normalize_reference("rtmp://Media.Host:1935/App"),
            "rtmp://media.host:1935/App"
        );
    }

    #[test]
    fn test_path_slashes_collapsed_and_trailing_stripped() {
        let resolver = IdentityResolver::new();
        assert_eq!(resolver.normalize_reference("http://x//a///b/"), "http://x/a/b");
        assert_eq!(resolver.normalize_reference("http://x/"), "http://x/");
        assert_eq!(resolver.normalize_reference("http://x"), "http://x/");
    }

    #[test]
    fn test_auth_params_dropped_and_rest_sorted() {
        let resolver = IdentityResolver::new();
        assert_eq!(
            resolver.normalize_reference("http://x/1?z=9&Token=zzz&a=1&SIG=s#frag"),
            "http://x/1?a=1&z=9"
        );
        assert_eq!(
            resolver.normalize_reference("http://x/1?token=zzz&id=2"),
            resolver.normalize_reference("http://x/1?id=2")
        );
    }

    #[test]
    fn test_only_auth_params_leaves_no_query() {
        let resolver = IdentityResolver::new();
        assert_eq!(
            resolver.normalize_reference("http://x/1?token=a&expires=1"),
            "http://x/1"
        );
    }

    #[test]
    fn test_extra_auth_params() {
        let resolver = IdentityResolver::with_extra_auth_params(["Uid", " "]);
        assert!(resolver.is_auth_param("uid"));
        assert!(resolver.is_auth_param("token"));
        assert_eq!(resolver.normalize_reference("http://x/1?uid=7&b=2"), "http://x/1?b=2");
    }

    #[test]
    fn test_non_url_reference() {
        let resolver = IdentityResolver::new();
        assert_eq!(
            resolver.normalize_reference("media//Shows/ep1.mp4#t=10"),
            "media/Shows/ep1.mp4"
        );
    }

    #[test]
    fn test_resolve_first_seen_wins() {
        let resolver = IdentityResolver::new();
        let mut seen = SeenSet::new();

        let first = resolver.resolve(&record("http://x/1", Some("abc")), &mut seen);
        let second = resolver.resolve(&record("http://x/2", Some("ABC")), &mut seen);
        let third = resolver.resolve(&record("http://x/2", None), &mut seen);

        assert!(first.is_accepted());
        assert_eq!(second, Resolution::Duplicate(IdentityKey::ById("abc".to_string())));
        assert!(third.is_accepted());
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(IdentityKey::ById("a".into()).to_string(), "id:a");
        assert_eq!(IdentityKey::ByReference("http://x/".into()).to_string(), "ref:http://x/");
    }
}
