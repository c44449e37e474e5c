use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{clock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};

/// Caps how often a single session's retry queue can hammer the backend
/// when many sessions resume at once after an outage, independent of (and
/// composed with) the circuit breaker. Grounded on `capture::
/// partition_limits::PartitionLimiter`, keyed here by session id instead of
/// Kafka partition key.
#[derive(Clone)]
pub struct SessionRateLimiter {
    limiter: Arc<RateLimiter<String, DefaultKeyedStateStore<String>, clock::DefaultClock>>,
}

impl SessionRateLimiter {
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::dashmap(quota)),
        }
    }

    pub fn is_limited(&self, session_id: &str) -> bool {
        self.limiter.check_key(&session_id.to_string()).is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_burst_then_limits() {
        let limiter = SessionRateLimiter::new(
            NonZeroU32::new(1).unwrap(),
            NonZeroU32::new(2).unwrap(),
        );

        assert!(!limiter.is_limited("sess-1"));
        assert!(!limiter.is_limited("sess-1"));
        assert!(limiter.is_limited("sess-1"));
    }

    #[test]
    fn sessions_are_tracked_independently() {
        let limiter = SessionRateLimiter::new(
            NonZeroU32::new(1).unwrap(),
            NonZeroU32::new(1).unwrap(),
        );

        assert!(!limiter.is_limited("sess-a"));
        assert!(limiter.is_limited("sess-a"));
        assert!(!limiter.is_limited("sess-b"));
    }
}
