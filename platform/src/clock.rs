/// Abstracts wall-clock access so components can be driven by a fake clock
/// in tests. Generalized from the teacher's `capture::time::TimeSource`,
/// which only exposed an ISO-8601 string; the agent also needs raw
/// milliseconds for session-relative timestamps (frame bundle headers,
/// tally windows, ANR elapsed-time computation).
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// An ISO-8601 rendering of `now_ms`, for wire payloads that want a
    /// human-readable timestamp (e.g. `buffer_meta.json.savedAt`).
    fn now_iso8601(&self) -> String {
        let millis = self.now_ms();
        let secs = (millis / 1000) as i64;
        let nanos = ((millis % 1000) * 1_000_000) as i32;
        match time::OffsetDateTime::from_unix_timestamp(secs) {
            Ok(dt) => {
                let dt = dt.replace_nanosecond(nanos as u32).unwrap_or(dt);
                dt.format(&time::format_description::well_known::Iso8601::DEFAULT)
                    .unwrap_or_default()
            }
            Err(_) => String::new(),
        }
    }
}

#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        time::OffsetDateTime::now_utc().unix_timestamp_nanos() as u64 / 1_000_000
    }
}

/// A clock that only advances when told to. Used by property tests that need
/// deterministic, strictly-controlled timestamps (rage-tap windows, ANR
/// thresholds, circuit-breaker cool-down).
#[derive(Clone)]
pub struct FakeClock {
    millis: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl FakeClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            millis: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.millis
            .fetch_add(delta_ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.millis.store(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(std::sync::atomic::Ordering::SeqCst)
    }
}
