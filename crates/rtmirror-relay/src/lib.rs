//! rtmirror relay engine.
//!
//! This crate reads a platform's filtered status stream, picks out the
//! records worth keeping and writes each one to an external ledger, then
//! tells the author how it went.
//!
//! # Modules
//!
//! - [`stream`] - Persistent stream connection with backoff reconnects
//! - [`pipeline`] - Rate limiter, redelivery guard and the relay workflow
//! - [`collab`] - Collaborator traits plus HTTP platform and JSON-RPC ledger adapters
//! - [`engine`] - The read loop
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ StreamConnection │  one long-lived HTTP body, newline-delimited JSON
//! └────────┬─────────┘
//!          │ line
//!          ▼
//! ┌──────────────────┐
//! │  parse + accept  │  malformed, self-authored and reposts dropped
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   RateLimiter    │  at most C relays per window W
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  RelayPipeline   │  parent fetch → ledger publish → reply
//! └──────────────────┘
//! ```
//!
//! Records are processed strictly one after another; only reconnect
//! exhaustion ends the process.

pub mod collab;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod stream;

#[cfg(test)]
mod testing;

pub use config::RelayConfig;
pub use credentials::Credentials;
pub use engine::{Engine, EngineStats, LineOutcome};
pub use error::{AckError, ConnectError, Error, FetchError, PublishError, ReadError, Result};

pub use collab::{
    HttpPlatform, JsonRpcLedger, Ledger, LedgerConfig, Network, PlatformConfig, RecordFetcher,
    ReplySender, TransactionRef,
};
pub use pipeline::{RateLimiter, RelayFailure, RelayOutcome, RelayPipeline, SeenIndex};
pub use stream::{BackoffPolicy, ConnectionState, HttpStreamTransport, StreamConnection};
