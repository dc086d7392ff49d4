//! Core types for the rtmirror relay.
//!
//! This crate provides:
//! - The stream record model and its decoding from platform JSON
//! - The relay filter (self-authored and repost records are never relayed)
//! - Bulletin construction with inline entity rewriting
//! - Prometheus metrics helpers
//! - Shared error types

mod bulletin;
mod error;
pub mod metrics;
mod record;

pub use bulletin::{
    Bulletin, DEFAULT_WEB_BASE, PROVENANCE_TAG, build_bulletin, post_url, rewrite_entities,
};
pub use error::{Error, Result};
pub use record::{Entity, EntityKind, EventRecord, RecordId, RejectReason, accept, parse, rejection};
