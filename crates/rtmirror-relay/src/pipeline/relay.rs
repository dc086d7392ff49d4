//! The publish/confirm workflow for one accepted record.

use super::RateLimiter;
use crate::collab::{Ledger, RecordFetcher, ReplySender, TransactionRef};
use crate::error::{FetchError, PublishError};
use metrics::counter;
use rand::seq::SliceRandom;
use rtmirror_core::{DEFAULT_WEB_BASE, EventRecord, build_bulletin};
use std::sync::Arc;
use thiserror::Error;

/// Replies sent when a record could not be persisted.
pub const APOLOGIES: [&str; 7] = [
    "Ouch... something broke. Please let someone know!",
    "Nope, that didn't work. Sorry!",
    "Recording the post failed. Apologies.",
    "That did not work. Sorry!",
    "Maybe try again? It seems broken to me.",
    "Definitely not working...sorry!",
    "Error! A human needs to fix this.",
];

/// Why a relay attempt did not reach the ledger.
#[derive(Error, Debug)]
pub enum RelayFailure {
    #[error("parent fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("ledger publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl RelayFailure {
    /// Metric label for the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Publish(_) => "publish",
        }
    }
}

/// Result of one relay attempt.
#[derive(Debug)]
pub enum RelayOutcome {
    Success(TransactionRef),
    Failure(RelayFailure),
}

impl RelayOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Turns one accepted record into a ledger write plus a reply to its author.
///
/// Every collaborator failure is logged and folded into the returned
/// [`RelayOutcome`]; nothing here can stop the read loop. Publishes and
/// replies are attempted exactly once.
pub struct RelayPipeline {
    fetcher: Arc<dyn RecordFetcher>,
    replies: Arc<dyn ReplySender>,
    ledger: Arc<dyn Ledger>,
    web_base: String,
    status_url: String,
}

impl RelayPipeline {
    pub fn new(
        fetcher: Arc<dyn RecordFetcher>,
        replies: Arc<dyn ReplySender>,
        ledger: Arc<dyn Ledger>,
        status_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            replies,
            ledger,
            web_base: DEFAULT_WEB_BASE.to_string(),
            status_url: status_url.into(),
        }
    }

    /// Override the platform web base used for links and markup.
    pub fn with_web_base(mut self, web_base: impl Into<String>) -> Self {
        self.web_base = web_base.into();
        self
    }

    /// Relay `record`, registering the action in `limiter` on success.
    ///
    /// The caller is expected to have checked [`RateLimiter::can_admit`].
    pub async fn relay(&self, record: &EventRecord, limiter: &mut RateLimiter) -> RelayOutcome {
        // Replies persist what was replied to, not the reply itself.
        let parent = match record.parent_id {
            Some(parent_id) => match self.fetcher.fetch(parent_id).await {
                Ok(parent) => Some(parent),
                Err(e) => {
                    tracing::warn!(
                        record_id = %record.id,
                        author = %record.author_handle,
                        parent_id = %parent_id,
                        "Parent fetch failed, dropping record: {}",
                        e
                    );
                    counter!("relay_failures_total", "stage" => "fetch").increment(1);
                    return RelayOutcome::Failure(e.into());
                }
            },
            None => None,
        };

        let (target, stored_parent) = match &parent {
            Some(p) if p.id != record.id => (p, true),
            _ => (record, false),
        };

        let timestamp = chrono::Utc::now().timestamp().max(0) as u64;
        let bulletin = build_bulletin(&self.web_base, target, timestamp);

        let txref = match self.ledger.publish(&bulletin).await {
            Ok(txref) => txref,
            Err(e) => {
                tracing::error!(
                    record_id = %record.id,
                    author = %record.author_handle,
                    target_id = %target.id,
                    "Ledger publish failed: {}",
                    e
                );
                counter!("relay_failures_total", "stage" => "publish").increment(1);
                self.apologize(record).await;
                return RelayOutcome::Failure(e.into());
            }
        };

        limiter.record(record.id);
        counter!("relay_success_total").increment(1);
        tracing::info!(
            record_id = %record.id,
            author = %record.author_handle,
            target_id = %target.id,
            stored_parent,
            "Relayed to ledger as {}",
            txref
        );

        self.confirm(record, stored_parent, &txref).await;
        RelayOutcome::Success(txref)
    }

    fn confirmation_text(&self, author: &str, stored_parent: bool, txref: &TransactionRef) -> String {
        let status = format!("{}/{}", self.status_url.trim_end_matches('/'), txref);
        if stored_parent {
            format!(
                "@{} the post you originally replied to has been sent to the public record. See its status here: {}",
                author, status
            )
        } else {
            format!(
                "@{} Your post has been sent to the public record. You can see its status here: {}",
                author, status
            )
        }
    }

    async fn confirm(&self, record: &EventRecord, stored_parent: bool, txref: &TransactionRef) {
        let text = self.confirmation_text(&record.author_handle, stored_parent, txref);
        if let Err(e) = self.replies.reply(&text, Some(record.id)).await {
            tracing::warn!(
                record_id = %record.id,
                author = %record.author_handle,
                "Confirmation reply failed: {}",
                e
            );
            counter!("relay_ack_failures_total", "kind" => "confirmation").increment(1);
        }
    }

    async fn apologize(&self, record: &EventRecord) {
        let text = format!("@{} {}", record.author_handle, pick_apology());
        if let Err(e) = self.replies.reply(&text, Some(record.id)).await {
            tracing::warn!(
                record_id = %record.id,
                author = %record.author_handle,
                "Apology reply failed: {}",
                e
            );
            counter!("relay_ack_failures_total", "kind" => "apology").increment(1);
        }
    }
}

fn pick_apology() -> &'static str {
    APOLOGIES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(APOLOGIES[0])
}
