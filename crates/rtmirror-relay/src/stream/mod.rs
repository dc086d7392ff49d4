//! Inbound stream handling.
//!
//! The stream is one long-lived HTTP response whose body is an endless
//! sequence of newline-terminated JSON records.
//!
//! - [`StreamTransport`] / [`StreamBody`] - how bytes are obtained
//! - [`HttpStreamTransport`] - the platform's streaming endpoint over reqwest
//! - [`StreamConnection`] - line framing plus the reconnect state machine
//! - [`BackoffPolicy`] - delays between reconnect attempts
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Streaming
//!                               │                  │ read error / EOF
//!                               │ fail             ▼
//!                               └────────────▶  Backoff ──attempts exhausted──▶ Disconnected (fatal)
//!                                                  │
//!                                                  └──connect ok──▶ Streaming
//! ```

mod backoff;
mod connection;
mod http;

pub use backoff::BackoffPolicy;
pub use connection::StreamConnection;
pub use http::{HttpStreamConfig, HttpStreamTransport};

use crate::error::{ConnectError, ReadError};
use async_trait::async_trait;
use bytes::Bytes;

/// Lifecycle state of the inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
    Backoff,
}

/// Opens the inbound stream.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Human-readable endpoint description for logs.
    fn describe(&self) -> String;

    /// Perform one connection attempt.
    async fn open(&self) -> Result<Box<dyn StreamBody>, ConnectError>;
}

/// Body of an open stream.
#[async_trait]
pub trait StreamBody: Send {
    /// Next chunk of bytes. `Ok(None)` means the upstream closed the body.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ReadError>;
}
