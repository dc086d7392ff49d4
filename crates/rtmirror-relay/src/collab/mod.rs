//! External collaborators of the relay pipeline.
//!
//! The pipeline only sees these traits. Adapters:
//!
//! - [`HttpPlatform`] - single-record fetch and reply write-back over the
//!   platform's REST API
//! - [`JsonRpcLedger`] - bulletin publishing over a ledger node's JSON-RPC
//!   interface, with optional wallet unlock

mod ledger;
mod platform;

pub use ledger::{JsonRpcLedger, LedgerConfig, Network};
pub use platform::{HttpPlatform, PlatformConfig};

use crate::error::{AckError, FetchError, PublishError};
use async_trait::async_trait;
use rtmirror_core::{Bulletin, EventRecord, RecordId};
use std::fmt;

/// Opaque reference to a ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRef(pub String);

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fetches one record by id.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch(&self, id: RecordId) -> Result<EventRecord, FetchError>;
}

/// Posts a short text back to the platform.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Post `text`, optionally as a reply to `in_reply_to`.
    async fn reply(&self, text: &str, in_reply_to: Option<RecordId>) -> Result<(), AckError>;
}

/// Durable ledger the bulletins are written to.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn publish(&self, bulletin: &Bulletin) -> Result<TransactionRef, PublishError>;
}
