//! # m3um Common Library
//!
//! Playlist merge core shared by the m3um tools:
//! - Record model (raw and normalized playlist entries)
//! - Record parser for `#EXTM3U` style playlist text
//! - Per-source metadata normalization
//! - Identity keys and first-seen-wins deduplication
//! - Post-normalization record filters
//! - Merge coordination and run statistics
//! - Playlist rendering

pub mod error;
pub mod filters;
pub mod identity;
pub mod merge;
pub mod normalizer;
pub mod parser;
pub mod record;
pub mod render;

pub use error::{Error, Result};
pub use identity::{IdentityKey, IdentityResolver, Resolution, SeenSet};
pub use merge::{FetchOutcome, MergeCoordinator, MergeOptions, MergeResult, SourceInput, SourceOutcome, SourceStatus};
pub use normalizer::{Normalizer, SourceContext};
pub use parser::RecordParser;
pub use record::{Attributes, MetadataLine, NormalizedRecord, RawRecord};
