//! Error types for the section engine and its parsers.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type.
///
/// Parsing and scanning errors are recovered locally with partial results.
/// Builder errors are contained to the inserter or washer that caused them.
#[derive(Error, Debug)]
pub enum Error {
    /// A line of tool output did not match its grammar
    #[error("malformed {kind} line {line:?}: {reason}")]
    MalformedLine {
        kind: &'static str,
        line: String,
        reason: String,
    },

    /// Builder stack discipline was violated
    #[error("unbalanced section: {0}")]
    UnbalancedSection(String),

    /// `set_heading` called after body text or a second time
    #[error("heading for {0} written after body content")]
    HeadingMisplaced(String),

    /// A deferred section builder failed; partial content is kept
    #[error("washer for {key} failed: {reason}")]
    WasherFailure { key: String, reason: String },

    /// A directory could not be read during a repository scan
    #[error("cannot read {path}: {source}")]
    ScanIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rendered hunk line outside the hunk's content was requested
    #[error("hunk line {line} out of range (hunk has {len} content lines)")]
    MapperOutOfRange { line: usize, len: usize },

    /// A hunk header did not carry a parsable new-file range
    #[error("invalid hunk header {0:?}")]
    BadHunkHeader(String),

    /// A section handle from a discarded tree generation was used
    #[error("section handle from generation {handle} used against generation {current}")]
    StaleSection { handle: u64, current: u64 },

    /// A section id that does not exist in the tree
    #[error("no section with id {0}")]
    UnknownSection(usize),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(kind: &'static str, line: &str, reason: impl Into<String>) -> Self {
        Error::MalformedLine {
            kind,
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}
