use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Consecutive-failure counter with a timed cooldown (§4.2). Incremented on
/// any upload failure (presign, PUT, confirm, transport error); reset on any
/// success.
pub struct CircuitBreaker {
    threshold: u64,
    cooldown_ms: u64,
    consecutive_failures: AtomicU64,
    open: AtomicBool,
    opened_at_ms: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(threshold: u64, cooldown_ms: u64) -> Self {
        Self {
            threshold,
            cooldown_ms,
            consecutive_failures: AtomicU64::new(0),
            open: AtomicBool::new(false),
            opened_at_ms: AtomicU64::new(0),
        }
    }

    /// `false` while open; auto-closes (and resets the failure streak) once
    /// the cooldown has elapsed, on the next call that observes it.
    pub fn can_upload_now(&self, now_ms: u64) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return true;
        }
        let opened_at = self.opened_at_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(opened_at) >= self.cooldown_ms {
            self.open.store(false, Ordering::Release);
            self.consecutive_failures.store(0, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.open.store(false, Ordering::Release);
    }

    /// Returns `true` exactly when this call is the one that crosses the
    /// threshold and opens the breaker, so the caller can bump the
    /// breaker-open telemetry counter precisely once per episode.
    pub fn record_failure(&self, now_ms: u64) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.threshold {
            let just_opened = self
                .open
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if just_opened {
                self.opened_at_ms.store(now_ms, Ordering::Release);
            }
            just_opened
        } else {
            false
        }
    }
}
