//! Playlist rendering
//!
//! Record layout:
//! ```text
//! #EXTINF:<duration> key="value" ...,<title>
//! #EXTVLCOPT:<key>=<value>        (zero or more directive lines)
//! <reference>
//! ```
//! Attributes are written in a fixed preferred order (`tvg-id`, `tvg-name`,
//! `tvg-logo`, `group-title`), followed by the rest in encounter order.

use crate::parser::{METADATA_TAG, PLAYLIST_HEADER};
use crate::record::{MetadataLine, NormalizedRecord, GROUP_ATTR, ID_ATTR, LOGO_ATTR, NAME_ATTR};
use std::fmt;

/// Attribute keys rendered ahead of all others
pub const PREFERRED_ATTRIBUTE_ORDER: [&str; 4] = [ID_ATTR, NAME_ATTR, LOGO_ATTR, GROUP_ATTR];

impl fmt::Display for MetadataLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", METADATA_TAG, self.duration_or_default())?;
        for (name, value) in self.attributes.ordered(&PREFERRED_ATTRIBUTE_ORDER) {
            // Values cannot carry double quotes: there is no escape syntax.
            write!(f, " {}=\"{}\"", name, value.replace('"', "'"))?;
        }
        write!(f, ",{}", self.title)
    }
}

impl fmt::Display for NormalizedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metadata)?;
        for line in &self.aux_lines {
            write!(f, "\n{}", line)?;
        }
        write!(f, "\n{}", self.reference)
    }
}

/// Lines of one record
pub fn record_lines(record: &NormalizedRecord) -> Vec<String> {
    let mut lines = Vec::with_capacity(record.aux_lines.len() + 2);
    lines.push(record.metadata.to_string());
    lines.extend(record.aux_lines.iter().cloned());
    lines.push(record.reference.clone());
    lines
}

/// Whole playlist: `#EXTM3U` once, then every record
pub fn playlist_lines(records: &[NormalizedRecord]) -> Vec<String> {
    let mut lines = vec![PLAYLIST_HEADER.to_string()];
    for record in records {
        lines.extend(record_lines(record));
    }
    lines
}
