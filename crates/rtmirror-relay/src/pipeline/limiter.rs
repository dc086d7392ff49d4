//! Sliding-window admission control for outbound relays.

use metrics::gauge;
use rtmirror_core::RecordId;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default number of relays allowed per window.
pub const DEFAULT_CAPACITY: usize = 24;

/// Default window duration (15 minutes).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// One admitted relay, as remembered by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayAction {
    pub timestamp: Instant,
    pub record_id: RecordId,
}

/// Fixed-capacity sliding window over relay actions.
///
/// The window is ordered most-recent-first. Admission is free while fewer
/// than `capacity` actions are retained; at capacity it is granted only once
/// the oldest retained action has aged out of the window.
#[derive(Debug)]
pub struct RateLimiter {
    /// Front is the newest action.
    window: VecDeque<RelayAction>,
    capacity: usize,
    window_dur: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    /// Create an empty limiter. A zero capacity is treated as one.
    pub fn new(capacity: usize, window_dur: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
            window_dur,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window_duration(&self) -> Duration {
        self.window_dur
    }

    /// Retained actions.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Retained actions, newest first.
    pub fn actions(&self) -> impl Iterator<Item = &RelayAction> {
        self.window.iter()
    }

    /// Whether a relay may happen now. Does not change the window.
    pub fn can_admit(&self) -> bool {
        self.can_admit_at(Instant::now())
    }

    pub fn can_admit_at(&self, now: Instant) -> bool {
        if self.window.len() < self.capacity {
            return true;
        }
        match self.window.back() {
            Some(oldest) => self.expired(oldest, now),
            None => true,
        }
    }

    /// Remember a relay of `record_id` that happened now.
    pub fn record(&mut self, record_id: RecordId) {
        self.record_at(record_id, Instant::now());
    }

    /// Remember a relay at `now`.
    ///
    /// `now` must not be earlier than any previously recorded timestamp.
    pub fn record_at(&mut self, record_id: RecordId, now: Instant) {
        self.window.push_front(RelayAction {
            timestamp: now,
            record_id,
        });

        if self.window.len() >= self.capacity {
            // Time-ordered, so the stale entries form one run at the back.
            while let Some(oldest) = self.window.back() {
                if !self.expired(oldest, now) {
                    break;
                }
                self.window.pop_back();
            }
            while self.window.len() > self.capacity {
                self.window.pop_back();
            }
        }

        gauge!("limiter_window_len").set(self.window.len() as f64);
    }

    fn expired(&self, action: &RelayAction, now: Instant) -> bool {
        action.timestamp + self.window_dur <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const W: Duration = Duration::from_secs(900);

    #[test]
    fn test_admits_until_full() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(24, W);

        for i in 0..24u64 {
            let now = start + Duration::from_secs(i);
            assert!(limiter.can_admit_at(now), "action {} should be admitted", i);
            limiter.record_at(RecordId(i), now);
        }

        assert_eq!(limiter.len(), 24);
        assert!(!limiter.can_admit_at(start + Duration::from_secs(24)));
        // Still inside the oldest action's window.
        assert!(!limiter.can_admit_at(start + W - Duration::from_millis(1)));
    }

    #[test]
    fn test_rolls_over_after_window() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(3, W);
        for i in 0..3u64 {
            limiter.record_at(RecordId(i), start + Duration::from_secs(i * 10));
        }
        assert!(!limiter.can_admit_at(start + Duration::from_secs(60)));

        let later = start + W;
        assert!(limiter.can_admit_at(later));
        limiter.record_at(RecordId(3), later);

        // The oldest action aged out; the other two are still live.
        let ids: Vec<_> = limiter.actions().map(|a| a.record_id.0).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert!(!limiter.can_admit_at(later));
    }

    #[test]
    fn test_evicts_every_stale_entry() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(4, W);
        for i in 0..4u64 {
            limiter.record_at(RecordId(i), start + Duration::from_secs(i));
        }

        let much_later = start + W * 3;
        limiter.record_at(RecordId(9), much_later);

        let ids: Vec<_> = limiter.actions().map(|a| a.record_id.0).collect();
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn test_capacity_is_hard_bound() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(2, W);
        // Recording without asking first still never grows past capacity.
        for i in 0..5u64 {
            limiter.record_at(RecordId(i), start + Duration::from_secs(i));
        }
        assert_eq!(limiter.len(), 2);
        let ids: Vec<_> = limiter.actions().map(|a| a.record_id.0).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_never_exceeds_capacity_in_any_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let start = Instant::now();
        let mut limiter = RateLimiter::new(24, W);
        let mut admitted: Vec<Instant> = Vec::new();

        let mut now = start;
        for i in 0..5_000u64 {
            now += Duration::from_secs(rng.gen_range(0..40));
            if limiter.can_admit_at(now) {
                limiter.record_at(RecordId(i), now);
                admitted.push(now);
            }
        }

        assert!(admitted.len() > 24);
        for (i, &t) in admitted.iter().enumerate() {
            let in_window = admitted[i..].iter().take_while(|&&u| u < t + W).count();
            assert!(in_window <= 24, "{} relays within one window", in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_rollover() {
        let mut limiter = RateLimiter::new(2, W);
        limiter.record(RecordId(1));
        limiter.record(RecordId(2));
        assert!(!limiter.can_admit());

        tokio::time::advance(W).await;
        assert!(limiter.can_admit());
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let limiter = RateLimiter::new(0, W);
        assert_eq!(limiter.capacity(), 1);
        assert!(limiter.can_admit_at(Instant::now()));
    }
}
