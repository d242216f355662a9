//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur converting between shapes.
///
/// These indicate malformed data at a serialization boundary, never a
/// recoverable sync condition: flatten/reconstruct themselves are total.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A row could not be decoded into its record type.
    #[error("invalid row in {table}: {source}")]
    InvalidRow {
        /// The table the row was read from.
        table: &'static str,
        /// The underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded to a row.
    #[error("failed to encode {table} record: {source}")]
    EncodeRow {
        /// The table the record belongs to.
        table: &'static str,
        /// The underlying encode failure.
        #[source]
        source: serde_json::Error,
    },

    /// The local document could not be decoded.
    #[error("invalid office document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}
