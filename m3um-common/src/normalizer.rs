//! Metadata Normalizer
//!
//! Enriches a [`RawRecord`] with its source context:
//! - `group-title` set to the source's group label
//! - relative references resolved against the source's base locator
//! - optional `http-user-agent` playback directive
//! - synthesized metadata line for bare references
//!
//! Normalization never mutates its input.

use crate::error::{Error, Result};
use crate::parser::{strip_tag, PLAYBACK_OPTION_TAG};
use crate::record::{MetadataLine, NormalizedRecord, RawRecord, GROUP_ATTR};
use url::Url;

/// Group label used when nothing can be derived from the source id
pub const DEFAULT_FALLBACK_GROUP: &str = "Other";

/// Playback option key carrying the player user-agent
pub const USER_AGENT_OPTION: &str = "http-user-agent";

/// Per-source context the normalizer applies to every record of a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    pub source_id: String,
    /// Value forced into every record's `group-title`
    pub group: String,
    /// Base for resolving relative references
    pub base: Option<Url>,
}

impl SourceContext {
    pub fn new(source_id: impl Into<String>, group: impl Into<String>, base: Option<Url>) -> Self {
        Self {
            source_id: source_id.into(),
            group: group.into(),
            base,
        }
    }

    /// Build the context for a source
    ///
    /// **Group label:** terminal path segment of `source_id` (extension
    /// stripped), else its hostname, else `fallback_group`.
    ///
    /// **Base:** `base_locator` when it parses as a URL, else `source_id`
    /// itself when that is an absolute URL.
    pub fn derive(source_id: &str, base_locator: Option<&str>, fallback_group: &str) -> Self {
        let group = group_label(source_id).unwrap_or_else(|| fallback_label(fallback_group));

        let base = base_locator
            .and_then(|locator| Url::parse(locator.trim()).ok())
            .or_else(|| Url::parse(source_id.trim()).ok())
            .filter(|url| !url.cannot_be_a_base());

        Self::new(source_id, group, base)
    }
}

/// Derive a human-readable group label from a source URL or path
///
/// Path separators, underscores and dashes collapse into single spaces;
/// case is preserved. `None` when nothing usable remains.
pub fn group_label(source_id: &str) -> Option<String> {
    let source_id = source_id.trim();

    let raw = match Url::parse(source_id) {
        Ok(url) if url.has_host() => {
            let segment = url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(decode_segment)
                .map(|segment| strip_extension(&segment).to_string())
                .filter(|segment| !segment.trim().is_empty());

            segment.unwrap_or_else(|| url.host_str().unwrap_or_default().to_string())
        }
        _ => {
            let segment = last_path_segment(source_id);
            strip_extension(&decode_segment(segment)).to_string()
        }
    };

    let label = collapse(&raw.replace('"', ""), &['/', '\\', '_', '-']);
    (!label.is_empty()).then_some(label)
}

/// Configured fallback group with double quotes removed
///
/// Attribute values cannot hold `"`; an empty result gives
/// [`DEFAULT_FALLBACK_GROUP`].
fn fallback_label(fallback_group: &str) -> String {
    let label = fallback_group.replace('"', "");
    match label.trim() {
        "" => DEFAULT_FALLBACK_GROUP.to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Title for a record without a metadata line, from its reference
///
/// Last path segment, percent-decoded, extension stripped, with `_`, `-`
/// and `.` turned into spaces. Empty when nothing remains.
pub fn derive_title(reference: &str) -> String {
    let path = match Url::parse(reference) {
        Ok(url) if !url.cannot_be_a_base() => url.path().to_string(),
        _ => reference
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let segment = decode_segment(last_path_segment(&path));
    collapse(strip_extension(&segment), &['_', '-', '.'])
}

/// Resolve a reference against an optional base
///
/// References that already carry a scheme, or that are not URL-like at
/// all, are returned unchanged.
pub fn resolve_reference(reference: &str, base: Option<&Url>) -> Result<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(Error::MalformedRecord("empty reference".to_string()));
    }

    match (Url::parse(reference), base) {
        (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => base
            .join(reference)
            .map(|resolved| resolved.to_string())
            .map_err(|e| {
                Error::MalformedRecord(format!(
                    "cannot resolve {:?} against {}: {}",
                    reference, base, e
                ))
            }),
        _ => Ok(reference.to_string()),
    }
}

/// Ensure exactly one `#EXTVLCOPT:http-user-agent=` directive
///
/// The first existing directive with that option key is replaced in place
/// and later ones removed; otherwise the directive goes to the front.
pub fn apply_user_agent(aux_lines: &mut Vec<String>, user_agent: &str) {
    let directive = format!("{}{}={}", PLAYBACK_OPTION_TAG, USER_AGENT_OPTION, user_agent);
    let mut replaced = false;

    aux_lines.retain_mut(|line| {
        let is_user_agent = playback_option_key(line)
            .map(|key| key.eq_ignore_ascii_case(USER_AGENT_OPTION))
            .unwrap_or(false);

        if !is_user_agent {
            return true;
        }
        if replaced {
            return false;
        }
        *line = directive.clone();
        replaced = true;
        true
    });

    if !replaced {
        aux_lines.insert(0, directive);
    }
}

/// Option key of a `#EXTVLCOPT:key=value` directive
pub fn playback_option_key(line: &str) -> Option<&str> {
    let body = strip_tag(line.trim(), PLAYBACK_OPTION_TAG)?;
    let key = body.split('=').next()?.trim();
    (!key.is_empty()).then_some(key)
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

fn strip_extension(segment: &str) -> &str {
    match segment.rfind('.') {
        Some(idx) if idx > 0 => &segment[..idx],
        _ => segment,
    }
}

/// Replace every separator with a space and squeeze whitespace runs
fn collapse(text: &str, separators: &[char]) -> String {
    text.chars()
        .map(|c| if separators.contains(&c) { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Metadata Normalizer
///
/// Holds the run-wide normalization options; the per-source part lives in
/// [`SourceContext`].
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// When set, every record gets an `http-user-agent` playback directive
    player_user_agent: Option<String>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer that injects the given player user-agent
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            player_user_agent: Some(user_agent.into()),
        }
    }

    pub fn player_user_agent(&self) -> Option<&str> {
        self.player_user_agent.as_deref()
    }

    /// Produce the normalized form of `raw` for the given source
    ///
    /// **Errors:** [`Error::MalformedRecord`] if the reference is empty or
    /// cannot be resolved against the source base.
    pub fn normalize(&self, raw: &RawRecord, context: &SourceContext) -> Result<NormalizedRecord> {
        let reference = resolve_reference(&raw.reference, context.base.as_ref())?;

        let mut metadata = match &raw.metadata {
            Some(metadata) => metadata.clone(),
            None => MetadataLine::with_title(derive_title(&reference)),
        };
        metadata.attributes.set(GROUP_ATTR, context.group.as_str());

        let mut aux_lines = raw.aux_lines.clone();
        if let Some(user_agent) = &self.player_user_agent {
            apply_user_agent(&mut aux_lines, user_agent);
        }

        Ok(NormalizedRecord {
            source_id: context.source_id.clone(),
            metadata,
            aux_lines,
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RecordParser;

    fn first_record(text: &str) -> RawRecord {
        RecordParser::new(text).records().next().unwrap()
    }

    #[test]
    fn test_group_label_from_url_segment() {
        let label = group_label(
            "https://raw.githubusercontent.com/alex8875/m3u/refs/heads/main/jcinema.m3u",
        );
        assert_eq!(label.as_deref(), Some("jcinema"));
    }

    #[test]
    fn test_group_label_collapses_separators() {
        assert_eq!(
            group_label("https://example.com/lists/Sony_Channels--HD.m3u").as_deref(),
            Some("Sony Channels HD")
        );
        assert_eq!(
            group_label("playlists/my%20list_local.m3u8").as_deref(),
            Some("my list local")
        );
    }

    #[test]
    fn test_group_label_falls_back_to_host() {
        assert_eq!(
            group_label("http://iptv-provider.example/").as_deref(),
            Some("iptv provider.example")
        );
    }

    #[test]
    fn test_group_label_windows_path() {
        assert_eq!(
            group_label("C:\\lists\\fan_code.m3u").as_deref(),
            Some("fan code")
        );
    }

    #[test]
    fn test_derive_uses_fallback_group() {
        let context = SourceContext::derive("   ", None, "Merged");
        assert_eq!(context.group, "Merged");
        assert!(context.base.is_none());
    }

    #[test]
    fn test_fallback_group_quotes_removed() {
        let context = SourceContext::derive("", None, "My \"Best\" TV");
        assert_eq!(context.group, "My Best TV");

        let record = Normalizer::new()
            .normalize(&first_record("#EXTINF:-1,A\nhttp://x/1"), &context)
            .unwrap();
        let reparsed = first_record(&record.to_string());
        assert_eq!(reparsed.attributes().and_then(|a| a.get(GROUP_ATTR)), Some("My Best TV"));

        assert_eq!(SourceContext::derive("", None, "\"\"").group, DEFAULT_FALLBACK_GROUP);
    }

    #[test]
    fn test_derive_prefers_explicit_base() {
        let context = SourceContext::derive(
            "http://origin/list.m3u",
            Some("http://cdn/live/index.m3u8"),
            DEFAULT_FALLBACK_GROUP,
        );
        assert_eq!(context.group, "list");
        assert_eq!(context.base.unwrap().as_str(), "http://cdn/live/index.m3u8");
    }

    #[test]
    fn test_relative_reference_resolved_against_base() {
        let base = Url::parse("http://cdn/live/index.m3u8").unwrap();
        assert_eq!(
            resolve_reference("stream.ts", Some(&base)).unwrap(),
            "http://cdn/live/stream.ts"
        );
        assert_eq!(
            resolve_reference("/abs/path.ts", Some(&base)).unwrap(),
            "http://cdn/abs/path.ts"
        );
    }

    #[test]
    fn test_absolute_or_baseless_reference_unchanged() {
        let base = Url::parse("http://cdn/live/index.m3u8").unwrap();
        assert_eq!(
            resolve_reference("rtmp://Other/x", Some(&base)).unwrap(),
            "rtmp://Other/x"
        );
        assert_eq!(resolve_reference("stream.ts", None).unwrap(), "stream.ts");
    }

    #[test]
    fn test_empty_reference_is_malformed() {
        assert!(matches!(
            resolve_reference("  ", None),
            Err(Error::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_group_attribute_replaced_case_insensitively() {
        let raw = first_record("#EXTINF:-1 Group-Title=\"Upstream\" tvg-id=\"a\",A\nhttp://x/1");
        let context = SourceContext::new("src", "Mine", None);
        let normalized = Normalizer::new().normalize(&raw, &context).unwrap();

        assert_eq!(normalized.group(), Some("Mine"));
        assert_eq!(normalized.attributes().len(), 2);
        let names: Vec<_> = normalized.attributes().iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Group-Title", "tvg-id"]);
    }

    #[test]
    fn test_group_attribute_inserted() {
        let raw = first_record("#EXTINF:-1,A\nhttp://x/1");
        let context = SourceContext::new("src", "Mine", None);
        let normalized = Normalizer::new().normalize(&raw, &context).unwrap();

        assert_eq!(normalized.group(), Some("Mine"));
        assert_eq!(normalized.source_id, "src");
    }

    #[test]
    fn test_input_record_not_mutated() {
        let raw = first_record("#EXTINF:-1 group-title=\"Up\",A\nhttp://x/1");
        let before = raw.clone();
        let context = SourceContext::new("src", "Mine", None);
        Normalizer::with_user_agent("UA").normalize(&raw, &context).unwrap();

        assert_eq!(raw, before);
    }

    #[test]
    fn test_user_agent_inserted_at_front() {
        let mut aux = vec!["#KODIPROP:inputstream=adaptive".to_string()];
        apply_user_agent(&mut aux, "Player/1.0");

        assert_eq!(
            aux,
            vec![
                "#EXTVLCOPT:http-user-agent=Player/1.0".to_string(),
                "#KODIPROP:inputstream=adaptive".to_string(),
            ]
        );
    }

    #[test]
    fn test_user_agent_replaces_existing_and_drops_repeats() {
        let mut aux = vec![
            "#EXTVLCOPT:http-referrer=http://ref".to_string(),
            "#EXTVLCOPT:HTTP-User-Agent=Old".to_string(),
            "#KODIPROP:x=y".to_string(),
            "#EXTVLCOPT:http-user-agent=Older".to_string(),
        ];
        apply_user_agent(&mut aux, "New");

        assert_eq!(
            aux,
            vec![
                "#EXTVLCOPT:http-referrer=http://ref".to_string(),
                "#EXTVLCOPT:http-user-agent=New".to_string(),
                "#KODIPROP:x=y".to_string(),
            ]
        );
    }

    #[test]
    fn test_bare_record_title_from_reference() {
        let raw = first_record("http://cdn/live/Sports_HD-feed.m3u8?token=1");
        let context = SourceContext::new("src", "G", None);
        let normalized = Normalizer::new().normalize(&raw, &context).unwrap();

        assert_eq!(normalized.title(), "Sports HD feed");
        assert_eq!(normalized.metadata.duration, None);
        assert_eq!(normalized.group(), Some("G"));
    }

    #[test]
    fn test_derive_title_fallbacks() {
        assert_eq!(derive_title("http://cdn/"), "");
        assert_eq!(derive_title("media/My%20Show.mp4"), "My Show");
        assert_eq!(derive_title("http://cdn/a/.hidden"), "hidden");
    }

    #[test]
    fn test_playback_option_key() {
        assert_eq!(playback_option_key("#EXTVLCOPT:http-referrer=x"), Some("http-referrer"));
        assert_eq!(playback_option_key("#KODIPROP:a=b"), None);
        assert_eq!(playback_option_key("#EXTVLCOPT:=x"), None);
    }
}
