//! Error types for record decoding and bulletin construction.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a raw stream line into a record.
///
/// Every variant here means the line is a malformed record: it is dropped
/// and never retried.
#[derive(Error, Debug)]
pub enum Error {
    /// The line is not JSON, or not JSON of the record shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The line decoded, but a field holds an unusable value.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },
}
