//! Common error types for m3um

use thiserror::Error;

/// Common result type for m3um operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the m3um crates
#[derive(Error, Debug)]
pub enum Error {
    /// Merge was asked to run without any source
    #[error("No sources configured: nothing to merge")]
    NoSources,

    /// Playlist record that cannot be turned into a usable entry
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
