//! Playlist record model
//!
//! A playlist entry moves through two shapes during a merge run:
//! - [`RawRecord`]: what the parser found in one source's text
//! - [`NormalizedRecord`]: the same entry after source-context enrichment,
//!   ready for identity resolution and rendering
//!
//! Attribute keys are compared case-insensitively everywhere. The spelling
//! seen first is the one kept for rendering.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Identifier attribute (dedup key source)
pub const ID_ATTR: &str = "tvg-id";
/// Display name attribute
pub const NAME_ATTR: &str = "tvg-name";
/// Logo attribute
pub const LOGO_ATTR: &str = "tvg-logo";
/// Group label attribute, forcibly set per source
pub const GROUP_ATTR: &str = "group-title";

/// Title reported for bare references (no metadata line)
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Duration written when a record carries none
pub const DEFAULT_DURATION: &str = "-1";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    name: String,
    value: String,
}

/// Ordered attribute mapping with case-insensitive keys
///
/// Iteration follows encounter order. Overwriting an existing key keeps its
/// position and its original spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: IndexMap<String, Attribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attribute value (case-insensitive key)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&fold(name))
            .map(|attr| attr.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&fold(name))
    }

    /// Insert a new attribute or overwrite the value of an existing one
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.get_mut(&fold(name)) {
            Some(existing) => existing.value = value,
            None => {
                self.entries.insert(
                    fold(name),
                    Attribute {
                        name: name.to_string(),
                        value,
                    },
                );
            }
        }
    }

    /// Remove an attribute, preserving the order of the remaining ones
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .shift_remove(&fold(name))
            .map(|attr| attr.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, value)` pairs in encounter order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|attr| (attr.name.as_str(), attr.value.as_str()))
    }

    /// `(name, value)` pairs with `preferred` keys first (in the given order),
    /// then every other attribute in encounter order
    pub fn ordered(&self, preferred: &[&str]) -> Vec<(&str, &str)> {
        let preferred_keys: Vec<String> = preferred.iter().map(|name| fold(name)).collect();

        let mut ordered: Vec<(&str, &str)> = preferred_keys
            .iter()
            .filter_map(|key| self.entries.get(key))
            .map(|attr| (attr.name.as_str(), attr.value.as_str()))
            .collect();

        ordered.extend(
            self.entries
                .iter()
                .filter(|(key, _)| !preferred_keys.contains(key))
                .map(|(_, attr)| (attr.name.as_str(), attr.value.as_str())),
        );

        ordered
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Parsed `#EXTINF` metadata line
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetadataLine {
    /// Raw duration token (`-1`, `0`, `123.5`), absent when the line had none
    pub duration: Option<String>,
    pub attributes: Attributes,
    pub title: String,
    /// Attribute region failed strict parsing; `title` carries the raw payload
    pub degraded: bool,
}

impl MetadataLine {
    /// Metadata line with no duration and no attributes
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            duration: None,
            attributes: Attributes::new(),
            title: title.into(),
            degraded: false,
        }
    }

    /// Duration token to render (defaults to `-1`)
    pub fn duration_or_default(&self) -> &str {
        self.duration.as_deref().unwrap_or(DEFAULT_DURATION)
    }
}

/// Playlist entry as found in one source, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// `None` for bare references
    pub metadata: Option<MetadataLine>,
    /// Directive lines between the metadata line and the reference
    pub aux_lines: Vec<String>,
    /// Locator the entry points to (never empty)
    pub reference: String,
}

impl RawRecord {
    /// Record for a reference line found outside any metadata context
    pub fn bare(reference: impl Into<String>) -> Self {
        Self {
            metadata: None,
            aux_lines: Vec::new(),
            reference: reference.into(),
        }
    }

    pub fn title(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.title.as_str())
            .unwrap_or(UNKNOWN_TITLE)
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        self.metadata.as_ref().map(|m| &m.attributes)
    }
}

/// Playlist entry after source-context enrichment
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NormalizedRecord {
    /// Source the entry came from
    pub source_id: String,
    pub metadata: MetadataLine,
    pub aux_lines: Vec<String>,
    pub reference: String,
}

impl NormalizedRecord {
    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn attributes(&self) -> &Attributes {
        &self.metadata.attributes
    }

    pub fn group(&self) -> Option<&str> {
        self.metadata.attributes.get(GROUP_ATTR)
    }

    /// Trimmed `tvg-id` value, if present and non-empty
    pub fn identifier(&self) -> Option<&str> {
        self.metadata
            .attributes
            .get(ID_ATTR)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
