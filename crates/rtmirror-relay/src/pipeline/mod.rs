//! Admission control and the relay workflow.
//!
//! - [`SeenIndex`] - bounded guard against records redelivered after a reconnect
//! - [`RateLimiter`] - at most `C` relays per sliding window `W`
//! - [`RelayPipeline`] - parent resolution, ledger publish, reply to the author
//!
//! # Flow
//!
//! ```text
//! [accepted record] → [SeenIndex] → [RateLimiter::can_admit] → [RelayPipeline::relay]
//!                                                                  │
//!                                      RateLimiter::record ◀── success
//! ```
//!
//! Records are handled one at a time. Nothing here is shared across tasks,
//! so the limiter's time-ordered window needs no locking.

mod limiter;
mod relay;
mod seen;

pub use limiter::{DEFAULT_CAPACITY, DEFAULT_WINDOW, RateLimiter, RelayAction};
pub use relay::{APOLOGIES, RelayFailure, RelayOutcome, RelayPipeline};
pub use seen::SeenIndex;
