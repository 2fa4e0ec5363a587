//! Record Parser
//!
//! Converts raw `#EXTM3U` playlist text into [`RawRecord`]s.
//!
//! **Line handling:**
//! 1. Lines are trimmed; blank lines and `#EXTM3U` header lines are skipped
//! 2. `#EXTINF:` opens a record (duration, `key="value"` attributes, title)
//! 3. Recognized auxiliary directives after it are collected in order,
//!    other comment lines are ignored
//! 4. The first non-comment line closes the record as its reference
//! 5. A non-comment line with no open metadata line is a bare reference
//!
//! Malformed input never aborts parsing. A metadata line that never reaches
//! a reference is dropped, and an attribute region that fails strict parsing
//! degrades to an attribute-less line carrying the raw payload as its title.

use crate::record::{Attributes, MetadataLine, RawRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Playlist header line
pub const PLAYLIST_HEADER: &str = "#EXTM3U";
/// Metadata line tag
pub const METADATA_TAG: &str = "#EXTINF:";
/// Playback option directive tag
pub const PLAYBACK_OPTION_TAG: &str = "#EXTVLCOPT:";
/// Directive tags kept with the record they precede
pub const AUXILIARY_TAGS: &[&str] = &[PLAYBACK_OPTION_TAG, "#KODIPROP:", "#EXTHTTP:", "#EXTGRP:"];

const COMMENT_PREFIX: char = '#';
const UTF8_BOM: char = '\u{feff}';

/// One `key="value"` pair at the start of the remaining attribute region
static ATTRIBUTE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([A-Za-z0-9_.:\-]+)="([^"]*)""#).expect("attribute pattern is valid")
});

/// Strip `tag` from the start of `line`, comparing case-insensitively
pub(crate) fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let head = line.get(..tag.len())?;
    if head.eq_ignore_ascii_case(tag) {
        line.get(tag.len()..)
    } else {
        None
    }
}

fn is_header(line: &str) -> bool {
    strip_tag(line, PLAYLIST_HEADER)
        .map(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        .unwrap_or(false)
}

/// True when the line starts with one of [`AUXILIARY_TAGS`]
pub fn is_auxiliary(line: &str) -> bool {
    AUXILIARY_TAGS
        .iter()
        .any(|tag| strip_tag(line, tag).is_some())
}

/// Parse a full `#EXTINF:` line; `None` if the line is not a metadata line
pub fn parse_metadata_line(line: &str) -> Option<MetadataLine> {
    strip_tag(line.trim(), METADATA_TAG).map(parse_metadata_payload)
}

/// Parse everything after the `#EXTINF:` tag
fn parse_metadata_payload(payload: &str) -> MetadataLine {
    let (duration, region) = split_duration(payload);

    match parse_attribute_region(region) {
        Some((attributes, title)) => MetadataLine {
            duration,
            attributes,
            title,
            degraded: false,
        },
        None => MetadataLine {
            duration,
            attributes: Attributes::new(),
            title: payload.trim().to_string(),
            degraded: true,
        },
    }
}

/// Split off a leading numeric duration token
fn split_duration(payload: &str) -> (Option<String>, &str) {
    let trimmed = payload.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || c == ',')
        .unwrap_or(trimmed.len());
    let token = &trimmed[..end];

    if !token.is_empty() && token.parse::<f64>().is_ok() {
        (Some(token.to_string()), &trimmed[end..])
    } else {
        (None, trimmed)
    }
}

/// Strictly parse `key="value"` pairs followed by an optional `,title`
///
/// Returns `None` as soon as the region holds anything else.
fn parse_attribute_region(region: &str) -> Option<(Attributes, String)> {
    let mut attributes = Attributes::new();
    let mut cursor = region;

    loop {
        cursor = cursor.trim_start();

        if cursor.is_empty() {
            return Some((attributes, String::new()));
        }
        if let Some(title) = cursor.strip_prefix(',') {
            return Some((attributes, title.trim().to_string()));
        }

        let captures = ATTRIBUTE_PAIR.captures(cursor)?;
        let matched = captures.get(0)?;
        attributes.set(&captures[1], &captures[2]);
        cursor = &cursor[matched.end()..];
    }
}

/// Parser over one source's text
///
/// Cheap to construct; every call to [`RecordParser::records`] starts a
/// fresh pass over the text.
#[derive(Debug, Clone, Copy)]
pub struct RecordParser<'a> {
    text: &'a str,
}

impl<'a> RecordParser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text: text.strip_prefix(UTF8_BOM).unwrap_or(text),
        }
    }

    /// Lazy iterator over the records of the text
    pub fn records(&self) -> Records<'a> {
        Records {
            lines: self.text.lines(),
            pending: None,
            malformed: 0,
            degraded: 0,
        }
    }
}

impl<'a> IntoIterator for &RecordParser<'a> {
    type Item = RawRecord;
    type IntoIter = Records<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.records()
    }
}

/// Metadata line waiting for its reference
#[derive(Debug)]
struct Pending {
    metadata: MetadataLine,
    aux_lines: Vec<String>,
}

/// Iterator returned by [`RecordParser::records`]
///
/// Also counts what it had to drop or degrade along the way.
#[derive(Debug)]
pub struct Records<'a> {
    lines: std::str::Lines<'a>,
    pending: Option<Pending>,
    malformed: usize,
    degraded: usize,
}

impl Records<'_> {
    /// Metadata lines dropped so far for lack of a reference
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Metadata lines whose attribute region failed strict parsing
    pub fn degraded(&self) -> usize {
        self.degraded
    }

    fn drop_pending(&mut self, reason: &str) {
        if let Some(pending) = self.pending.take() {
            self.malformed += 1;
            debug!(title = %pending.metadata.title, reason, "Dropping metadata line without reference");
        }
    }
}

impl Iterator for Records<'_> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        while let Some(line) = self.lines.next() {
            let line = line.trim();
            if line.is_empty() || is_header(line) {
                continue;
            }

            if let Some(payload) = strip_tag(line, METADATA_TAG) {
                self.drop_pending("superseded by a later metadata line");

                let metadata = parse_metadata_payload(payload);
                if metadata.degraded {
                    self.degraded += 1;
                    debug!(line, "Attribute region failed strict parsing");
                }
                self.pending = Some(Pending {
                    metadata,
                    aux_lines: Vec::new(),
                });
                continue;
            }

            if line.starts_with(COMMENT_PREFIX) {
                if let Some(pending) = self.pending.as_mut() {
                    if is_auxiliary(line) {
                        pending.aux_lines.push(line.to_string());
                    }
                }
                continue;
            }

            let record = match self.pending.take() {
                Some(pending) => RawRecord {
                    metadata: Some(pending.metadata),
                    aux_lines: pending.aux_lines,
                    reference: line.to_string(),
                },
                None => RawRecord::bare(line),
            };
            return Some(record);
        }

        self.drop_pending("end of input");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::UNKNOWN_TITLE;

    fn parse_all(text: &str) -> Vec<RawRecord> {
        RecordParser::new(text).records().collect()
    }

    #[test]
    fn test_parses_metadata_attributes_and_title() {
        let records = parse_all(
            "#EXTM3U\n#EXTINF:-1 tvg-id=\"abc\" tvg-logo=\"http://x/l.png\" group-title=\"News\",Channel One\nhttp://x/1\n",
        );

        assert_eq!(records.len(), 1);
        let metadata = records[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.duration.as_deref(), Some("-1"));
        assert_eq!(metadata.attributes.get("tvg-id"), Some("abc"));
        assert_eq!(metadata.attributes.get("tvg-logo"), Some("http://x/l.png"));
        assert_eq!(metadata.attributes.get("group-title"), Some("News"));
        assert_eq!(metadata.title, "Channel One");
        assert!(!metadata.degraded);
        assert_eq!(records[0].reference, "http://x/1");
    }

    #[test]
    fn test_metadata_tag_is_case_insensitive() {
        let records = parse_all("#extinf:0,Lower\nhttp://x/1");
        assert_eq!(records[0].title(), "Lower");
        assert_eq!(records[0].metadata.as_ref().unwrap().duration.as_deref(), Some("0"));
    }

    #[test]
    fn test_commas_inside_attribute_values() {
        let records = parse_all("#EXTINF:-1 tvg-name=\"A, B\",Title, with comma\nhttp://x/1");
        let metadata = records[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.attributes.get("tvg-name"), Some("A, B"));
        assert_eq!(metadata.title, "Title, with comma");
    }

    #[test]
    fn test_missing_duration() {
        let records = parse_all("#EXTINF:tvg-id=\"x\",No Duration\nhttp://x/1");
        let metadata = records[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.duration, None);
        assert_eq!(metadata.attributes.get("tvg-id"), Some("x"));
        assert_eq!(metadata.title, "No Duration");
    }

    #[test]
    fn test_auxiliary_lines_collected_in_order() {
        let text = "#EXTINF:-1,Chan\n#EXTVLCOPT:http-user-agent=UA\n\n# random comment\n#KODIPROP:inputstream=adaptive\nhttp://x/1";
        let records = parse_all(text);

        assert_eq!(
            records[0].aux_lines,
            vec![
                "#EXTVLCOPT:http-user-agent=UA".to_string(),
                "#KODIPROP:inputstream=adaptive".to_string(),
            ]
        );
        assert_eq!(records[0].reference, "http://x/1");
    }

    #[test]
    fn test_bare_reference_outside_metadata_context() {
        let records = parse_all("#EXTM3U\nhttp://x/bare.ts\n");

        assert_eq!(records.len(), 1);
        assert!(records[0].metadata.is_none());
        assert!(records[0].aux_lines.is_empty());
        assert_eq!(records[0].title(), UNKNOWN_TITLE);
    }

    #[test]
    fn test_metadata_without_reference_is_dropped() {
        let parser = RecordParser::new("#EXTINF:-1,First\nhttp://x/1\n#EXTINF:-1,Orphan\n");
        let mut records = parser.records();

        assert_eq!(records.next().map(|r| r.reference), Some("http://x/1".to_string()));
        assert!(records.next().is_none());
        assert_eq!(records.malformed(), 1);
    }

    #[test]
    fn test_consecutive_metadata_lines_keep_latest() {
        let parser = RecordParser::new("#EXTINF:-1,Old\n#EXTVLCOPT:k=v\n#EXTINF:-1,New\nhttp://x/1");
        let mut records = parser.records();

        let record = records.next().unwrap();
        assert_eq!(record.title(), "New");
        assert!(record.aux_lines.is_empty());
        assert_eq!(records.malformed(), 1);
    }

    #[test]
    fn test_degraded_attribute_region() {
        let parser = RecordParser::new("#EXTINF:-1 tvg-id=abc broken,Title\nhttp://x/1");
        let mut records = parser.records();

        let record = records.next().unwrap();
        let metadata = record.metadata.as_ref().unwrap();
        assert!(metadata.degraded);
        assert!(metadata.attributes.is_empty());
        assert_eq!(metadata.duration.as_deref(), Some("-1"));
        assert_eq!(metadata.title, "-1 tvg-id=abc broken,Title");
        assert_eq!(records.degraded(), 1);
    }

    #[test]
    fn test_unterminated_quote_degrades() {
        let records = parse_all("#EXTINF:-1 tvg-id=\"abc,Title\nhttp://x/1");
        assert!(records[0].metadata.as_ref().unwrap().degraded);
    }

    #[test]
    fn test_repeated_headers_and_blank_lines_skipped() {
        let text = "#EXTM3U x-tvg-url=\"http://epg\"\n\n   \n#EXTM3U\n#EXTINF:-1,A\r\nhttp://x/1   \r\n";
        let records = parse_all(text);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reference, "http://x/1");
    }

    #[test]
    fn test_records_restart_from_scratch() {
        let parser = RecordParser::new("#EXTINF:-1,A\nhttp://x/1\nhttp://x/2");

        let first: Vec<_> = parser.records().collect();
        let second: Vec<_> = (&parser).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_leading_bom_ignored() {
        let records = parse_all("\u{feff}#EXTM3U\n#EXTINF:-1,A\nhttp://x/1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title(), "A");
    }

    #[test]
    fn test_duplicate_attribute_keys_keep_last_value() {
        let records = parse_all("#EXTINF:-1 tvg-id=\"a\" TVG-ID=\"b\",T\nhttp://x/1");
        let attrs = records[0].attributes().unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("tvg-id"), Some("b"));
    }

    #[test]
    fn test_parse_metadata_line_rejects_other_lines() {
        assert!(parse_metadata_line("#EXTVLCOPT:a=b").is_none());
        assert!(parse_metadata_line("#EXTINF:-1,X").is_some());
    }

    #[test]
    fn test_is_auxiliary() {
        assert!(is_auxiliary("#EXTVLCOPT:http-referrer=http://x"));
        assert!(is_auxiliary("#kodiprop:inputstream=adaptive"));
        assert!(is_auxiliary("#EXTHTTP:{\"cookie\":\"a=b\"}"));
        assert!(!is_auxiliary("# plain comment"));
    }
}
