use thiserror::Error;

use super::node::NodeKind;

/// Errors surfaced by catalog construction, persistence and extraction.
///
/// Everything here is single-attempt: a failed build or extraction is
/// reported to the caller and never retried internally.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A record arrived before the record that must own it (e.g. a volume
    /// record with no preceding set record). The build aborts rather than
    /// guessing a parent.
    #[error("{record} record encountered with no active {requires} to attach it to")]
    StructuralViolation {
        record: &'static str,
        requires: &'static str,
    },

    /// Extraction was requested on a node level that does not materialize
    /// on a filesystem.
    #[error("{0} nodes cannot be extracted; only volume, folder and file nodes can")]
    UnsupportedExtraction(NodeKind),

    /// The record stream could not interpret the bytes at the current
    /// position (malformed or truncated image, or a catalog offset that
    /// points at non-record data).
    #[error("failed to decode descriptor record: {0}")]
    Decode(anyhow::Error),

    /// A catalog index file does not match the fixed sidecar layout.
    #[error("catalog index does not match the expected layout: {0}")]
    CatalogFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<anyhow::Error> for CatalogError {
    fn from(err: anyhow::Error) -> Self {
        CatalogError::Decode(err)
    }
}
