/// Governs how many times the dispatcher will re-enqueue a failed upload.
///
/// The teacher's `hook-common::retry::RetryPolicy` computes an exponentially
/// growing delay (`initial_interval * backoff_coefficient.pow(attempt)`,
/// clamped to a maximum). §4.2/§9 of this spec is explicit that the
/// dispatcher does **not** apply that kind of delay at this layer: a failed
/// upload with `attempt < max_attempts` is simply re-enqueued, and retries
/// depend on the orchestrator's own foreground transitions or natural new
/// work arriving. Whether to add jitter/backoff later is left as an open
/// question, so `max_attempts` is a constructor parameter rather than a
/// hardcoded constant — adding a delay later is a non-breaking change to
/// this type, not a rewrite of its callers.
#[derive(Debug, Clone, Copy)]
pub struct AttemptPolicy {
    max_attempts: u32,
}

impl AttemptPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_max_attempts() {
        let policy = AttemptPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
