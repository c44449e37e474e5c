use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-session counters used by the server-side retention decision (§3, §4.7).
/// Atomic fields: readers may observe slightly stale values, which is
/// acceptable per the concurrency model (§5).
#[derive(Default)]
pub struct Tallies {
    taps: AtomicU64,
    rage_taps: AtomicU64,
    dead_taps: AtomicU64,
    gestures: AtomicU64,
    faults: AtomicU64,
    stalled: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TalliesSnapshot {
    pub taps: u64,
    pub rage_taps: u64,
    pub dead_taps: u64,
    pub gestures: u64,
    pub faults: u64,
    pub stalled: u64,
}

impl Tallies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tap(&self) {
        self.taps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rage_tap(&self) {
        self.rage_taps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_tap(&self) {
        self.dead_taps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gesture(&self) {
        self.gestures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stalled(&self) {
        self.stalled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TalliesSnapshot {
        TalliesSnapshot {
            taps: self.taps.load(Ordering::Relaxed),
            rage_taps: self.rage_taps.load(Ordering::Relaxed),
            dead_taps: self.dead_taps.load(Ordering::Relaxed),
            gestures: self.gestures.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            stalled: self.stalled.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.taps.store(0, Ordering::Relaxed);
        self.rage_taps.store(0, Ordering::Relaxed);
        self.dead_taps.store(0, Ordering::Relaxed);
        self.gestures.store(0, Ordering::Relaxed);
        self.faults.store(0, Ordering::Relaxed);
        self.stalled.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_independently() {
        let tallies = Tallies::new();
        tallies.record_tap();
        tallies.record_tap();
        tallies.record_rage_tap();
        let snapshot = tallies.snapshot();
        assert_eq!(snapshot.taps, 2);
        assert_eq!(snapshot.rage_taps, 1);
        assert_eq!(snapshot.gestures, 0);
    }
}
