use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use platform::{Clock, MainThreadExecutor, MainThreadStackProvider};
use sdk_common::{Incident, Tallies};
use stability_monitor::IncidentStore;

/// Reported once per detected hang, for `replay-orchestrator` to turn into
/// an `anr` event (§4.5) — this crate has no dependency on the orchestrator,
/// so the report travels out through a callback instead.
#[derive(Debug, Clone)]
pub struct AnrReport {
    pub session_id: String,
    pub timestamp_ms: u64,
    pub duration_ms: u64,
    pub frames: Vec<String>,
}

struct Counters {
    ping_sequence: AtomicU64,
    pong_sequence: AtomicU64,
    last_response_ms: AtomicU64,
}

impl Counters {
    fn reset(&self, now_ms: u64) {
        self.ping_sequence.store(0, Ordering::SeqCst);
        self.pong_sequence.store(0, Ordering::SeqCst);
        self.last_response_ms.store(now_ms, Ordering::SeqCst);
    }
}

/// C5 — daemon watchdog detecting main-thread hangs via ping/pong (§4.5).
pub struct AnrSentinel {
    main_thread: Arc<dyn MainThreadExecutor>,
    stack_provider: Arc<dyn MainThreadStackProvider>,
    clock: Arc<dyn Clock>,
    store: Arc<IncidentStore>,
    tallies: Arc<Tallies>,
    threshold_ms: u64,
    on_anr: Arc<dyn Fn(AnrReport) + Send + Sync>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    session_id: Mutex<Option<String>>,
}

impl AnrSentinel {
    pub fn new(
        main_thread: Arc<dyn MainThreadExecutor>,
        stack_provider: Arc<dyn MainThreadStackProvider>,
        clock: Arc<dyn Clock>,
        store: Arc<IncidentStore>,
        tallies: Arc<Tallies>,
        threshold_ms: u64,
        on_anr: Arc<dyn Fn(AnrReport) + Send + Sync>,
    ) -> Self {
        Self {
            main_thread,
            stack_provider,
            clock,
            store,
            tallies,
            threshold_ms,
            on_anr,
            counters: Arc::new(Counters {
                ping_sequence: AtomicU64::new(0),
                pong_sequence: AtomicU64::new(0),
                last_response_ms: AtomicU64::new(0),
            }),
            running: Arc::new(AtomicBool::new(false)),
            session_id: Mutex::new(None),
        }
    }

    /// Idempotent: resets counters and (re)starts the daemon thread if not
    /// already running. Stale values from a prior foreground period are
    /// cleared so an old hang can't be reported against a new session.
    pub fn activate(&self, session_id: impl Into<String>) {
        *self.session_id.lock().unwrap() = Some(session_id.into());
        self.counters.reset(self.clock.now_ms());

        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let main_thread = Arc::clone(&self.main_thread);
        let stack_provider = Arc::clone(&self.stack_provider);
        let clock = Arc::clone(&self.clock);
        let store = Arc::clone(&self.store);
        let tallies = Arc::clone(&self.tallies);
        let threshold_ms = self.threshold_ms;
        let on_anr = Arc::clone(&self.on_anr);
        let counters = Arc::clone(&self.counters);
        let running = Arc::clone(&self.running);
        let session_id = Arc::new(Mutex::new(
            self.session_id.lock().unwrap().clone().unwrap_or_default(),
        ));

        std::thread::Builder::new()
            .name("rj-anr-watchdog".to_string())
            .spawn(move || {
                watchdog_loop(
                    main_thread,
                    stack_provider,
                    clock,
                    store,
                    tallies,
                    threshold_ms,
                    on_anr,
                    counters,
                    running,
                    session_id,
                )
            })
            .expect("failed to spawn ANR watchdog thread");
    }

    pub fn deactivate(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[allow(clippy::too_many_arguments)]
fn watchdog_loop(
    main_thread: Arc<dyn MainThreadExecutor>,
    stack_provider: Arc<dyn MainThreadStackProvider>,
    clock: Arc<dyn Clock>,
    store: Arc<IncidentStore>,
    tallies: Arc<Tallies>,
    threshold_ms: u64,
    on_anr: Arc<dyn Fn(AnrReport) + Send + Sync>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    session_id: Arc<Mutex<String>>,
) {
    while running.load(Ordering::SeqCst) {
        let sequence = counters.ping_sequence.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let counters = Arc::clone(&counters);
            let clock = Arc::clone(&clock);
            main_thread.post(Box::new(move || {
                counters.pong_sequence.store(sequence, Ordering::SeqCst);
                counters.last_response_ms.store(clock.now_ms(), Ordering::SeqCst);
            }));
        }

        std::thread::sleep(Duration::from_millis(1000));
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let now = clock.now_ms();
        let last_response = counters.last_response_ms.load(Ordering::SeqCst);
        let elapsed = now.saturating_sub(last_response);
        let missed = sequence.saturating_sub(counters.pong_sequence.load(Ordering::SeqCst));

        if elapsed >= threshold_ms && missed > 0 {
            let frames = stack_provider.capture_stack();
            let sid = session_id.lock().unwrap().clone();

            tracing::warn!(session_id = %sid, elapsed_ms = elapsed, missed_pings = missed, "main thread unresponsive");

            let incident = Incident::anr(sid.clone(), now, elapsed, frames.clone());
            store.persist(&incident);
            tallies.record_stalled();

            on_anr(AnrReport {
                session_id: sid,
                timestamp_ms: now,
                duration_ms: elapsed,
                frames,
            });

            // Reset so the same stall isn't reported again next tick.
            counters.reset(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::FakeClock;
    use std::sync::atomic::AtomicUsize;

    struct StuckMainThread {
        responds: AtomicBool,
    }

    impl MainThreadExecutor for StuckMainThread {
        fn post(&self, job: Box<dyn FnOnce() + Send>) -> bool {
            if self.responds.load(Ordering::SeqCst) {
                job();
                true
            } else {
                // Simulate a hung main thread: the job is accepted but
                // never runs.
                true
            }
        }
    }

    struct FixedStack;

    impl MainThreadStackProvider for FixedStack {
        fn capture_stack(&self) -> Vec<String> {
            vec!["MainActivity.onDraw:88".to_string()]
        }
    }

    #[test]
    fn responsive_main_thread_keeps_counters_caught_up() {
        let clock = Arc::new(FakeClock::new(1_000));
        let counters = Counters {
            ping_sequence: AtomicU64::new(5),
            pong_sequence: AtomicU64::new(5),
            last_response_ms: AtomicU64::new(clock.now_ms()),
        };

        let elapsed = clock.now_ms().saturating_sub(counters.last_response_ms.load(Ordering::SeqCst));
        let missed = 5u64.saturating_sub(counters.pong_sequence.load(Ordering::SeqCst));
        assert_eq!(elapsed, 0);
        assert_eq!(missed, 0);
    }

    #[test]
    fn hang_arithmetic_crosses_threshold_when_main_thread_stops_responding() {
        let last_response_ms = 1_000u64;
        let now = 7_000u64;
        let ping_sequence = 6u64;
        let pong_sequence = 1u64;

        let elapsed = now.saturating_sub(last_response_ms);
        let missed = ping_sequence.saturating_sub(pong_sequence);

        assert!(elapsed >= 5000);
        assert!(missed > 0);
    }

    #[test]
    fn activate_is_idempotent_and_deactivate_stops_the_loop() {
        let clock = Arc::new(FakeClock::new(0));
        let main_thread = Arc::new(StuckMainThread {
            responds: AtomicBool::new(true),
        });
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IncidentStore::new(dir.path()));
        let tallies = Arc::new(Tallies::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let sentinel = AnrSentinel::new(
            main_thread,
            Arc::new(FixedStack),
            clock,
            store,
            tallies,
            5000,
            Arc::new(move |_report| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        sentinel.activate("sess-1");
        assert!(sentinel.is_active());
        sentinel.activate("sess-1");
        sentinel.deactivate();
        assert!(!sentinel.is_active());
    }
}
