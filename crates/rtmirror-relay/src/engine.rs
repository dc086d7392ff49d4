//! The read loop tying the stream to the relay pipeline.
//!
//! One line is handled to completion before the next is read:
//!
//! ```text
//! next_line → parse → accept → seen? → can_admit → relay
//!     │                                                │
//!     └─ read error → establish (backoff) ◀────────────┘
//! ```
//!
//! Only an exhausted reconnect ends the loop with an error. Everything
//! below it is logged and counted.

use crate::config::RelayConfig;
use crate::error::Result;
use crate::pipeline::{RateLimiter, RelayOutcome, RelayPipeline, SeenIndex};
use crate::stream::{ConnectionState, StreamConnection};
use metrics::counter;
use rtmirror_core::RejectReason;
use tokio::sync::watch;

/// Counters for one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Non-blank lines read.
    pub lines: u64,
    pub malformed: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub rate_limited: u64,
    pub relayed: u64,
    pub failed: u64,
    pub reconnects: u64,
}

/// What happened to one stream line.
#[derive(Debug)]
pub enum LineOutcome {
    /// Keep-alive.
    Blank,
    Malformed,
    Rejected(RejectReason),
    /// Already handed to the pipeline earlier.
    Duplicate,
    RateLimited,
    Relayed(RelayOutcome),
}

/// Drives the stream and the relay pipeline.
pub struct Engine {
    stream: StreamConnection,
    pipeline: RelayPipeline,
    limiter: RateLimiter,
    seen: SeenIndex,
    self_handle: String,
    stats: EngineStats,
}

impl Engine {
    pub fn new(stream: StreamConnection, pipeline: RelayPipeline, config: &RelayConfig) -> Self {
        Self {
            stream,
            pipeline,
            limiter: RateLimiter::new(config.window_capacity, config.window),
            seen: SeenIndex::new(config.seen_capacity),
            self_handle: config.self_handle.clone(),
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stream(&self) -> &StreamConnection {
        &self.stream
    }

    /// Handle one raw stream line.
    pub async fn handle_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Blank;
        }
        self.stats.lines += 1;
        counter!("stream_lines_total").increment(1);

        let record = match rtmirror_core::parse(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!("Dropping malformed record: {}", e);
                self.stats.malformed += 1;
                counter!("stream_records_malformed_total").increment(1);
                return LineOutcome::Malformed;
            }
        };

        if let Some(reason) = rtmirror_core::rejection(&record, &self.self_handle) {
            tracing::debug!(
                record_id = %record.id,
                author = %record.author_handle,
                "Not relaying: {}",
                reason
            );
            self.stats.rejected += 1;
            counter!("stream_records_rejected_total", "reason" => reason.as_str()).increment(1);
            return LineOutcome::Rejected(reason);
        }

        if self.seen.contains(record.id) {
            tracing::debug!(record_id = %record.id, "Skipping redelivered record");
            self.stats.duplicates += 1;
            counter!("stream_records_duplicate_total").increment(1);
            return LineOutcome::Duplicate;
        }

        if !self.limiter.can_admit() {
            tracing::info!(
                record_id = %record.id,
                author = %record.author_handle,
                "Relay window full ({} per {:?}), dropping record",
                self.limiter.capacity(),
                self.limiter.window_duration()
            );
            self.stats.rate_limited += 1;
            counter!("relay_rate_limited_total").increment(1);
            return LineOutcome::RateLimited;
        }

        self.seen.insert(record.id);
        let outcome = self.pipeline.relay(&record, &mut self.limiter).await;
        if outcome.is_success() {
            self.stats.relayed += 1;
        } else {
            self.stats.failed += 1;
        }
        LineOutcome::Relayed(outcome)
    }

    /// Run until shutdown is signalled or reconnecting gives up.
    ///
    /// On shutdown the pending read is abandoned and the stream closed.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<EngineStats> {
        tracing::info!(
            self_handle = %self.self_handle,
            capacity = self.limiter.capacity(),
            window = ?self.limiter.window_duration(),
            "Relay engine starting"
        );

        let result = self.drive(&mut shutdown).await;
        self.stream.close();
        self.stats.reconnects = self.stream.reconnects();

        match result {
            Ok(()) => {
                tracing::info!("Relay engine stopped");
                Ok(self.stats.clone())
            }
            Err(e) => {
                tracing::error!("Relay engine stopping: {}", e);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        loop {
            if self.stream.state() != ConnectionState::Streaming {
                tokio::select! {
                    biased;
                    _ = stopped(shutdown) => return Ok(()),
                    connected = self.stream.establish() => connected?,
                }
            }

            let read = tokio::select! {
                biased;
                _ = stopped(shutdown) => return Ok(()),
                read = self.stream.next_line() => read,
            };

            match read {
                Ok(line) => {
                    self.handle_line(&line).await;
                }
                Err(e) => tracing::warn!("Stream read failed: {}. Reconnecting", e),
            }
        }
    }
}

/// Resolves once shutdown has been requested. Never resolves if the
/// sender is gone without having requested it.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
