//! Error types for the relay engine.
//!
//! Each collaborator failure has its own type so the pipeline can decide
//! locally what to do with it. Only [`Error::ReconnectExhausted`] is meant to
//! stop the process.

use rtmirror_core::RecordId;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The stream could not be re-established within the attempt bound.
    #[error("stream reconnect gave up after {attempts} attempts: {last}")]
    ReconnectExhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// The last connect failure.
        last: ConnectError,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials file could not be used.
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// I/O error, e.g. an unreadable certificate file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction error.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Opening the stream failed.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Transport-level failure (DNS, TCP, TLS).
    #[error("connect failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("stream endpoint returned status {0}")]
    Status(u16),
}

/// Reading the next line from an open stream failed.
#[derive(Error, Debug)]
pub enum ReadError {
    /// The upstream closed the body.
    #[error("stream closed by upstream")]
    Eof,

    /// Transport-level failure mid-body.
    #[error("stream read failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A line that is not UTF-8.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// `next_line` was called without an open stream.
    #[error("stream is not connected")]
    NotConnected,

    /// Other transport failures.
    #[error("stream read failed: {0}")]
    Transport(String),
}

/// Fetching a single record from the platform failed.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure.
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success status.
    #[error("fetch of record {id} returned status {status}")]
    Status {
        /// The record requested.
        id: RecordId,
        /// HTTP status code.
        status: u16,
    },

    /// The body did not decode into a record.
    #[error("fetched record is malformed: {0}")]
    Malformed(#[from] rtmirror_core::Error),

    /// The record does not exist or is not visible.
    #[error("record {0} not found")]
    NotFound(RecordId),
}

/// Publishing a bulletin to the ledger failed.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Transport-level failure.
    #[error("ledger request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The ledger node answered with a non-success status.
    #[error("ledger returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The ledger node returned a JSON-RPC error object.
    #[error("ledger rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The response was not the expected shape.
    #[error("unexpected ledger response: {0}")]
    UnexpectedResponse(String),

    /// Unlocking the wallet before publishing failed.
    #[error("wallet unlock failed: {0}")]
    WalletUnlock(String),
}

/// Sending a reply to the platform failed.
#[derive(Error, Debug)]
pub enum AckError {
    /// Transport-level failure.
    #[error("reply failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success status.
    #[error("reply returned status {0}")]
    Status(u16),
}
