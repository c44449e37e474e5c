use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// A monotonic per-session snapshot of the dispatcher's own health, embedded
/// in every confirm and session-end call (§4.2, §4.7). Reset to zero only
/// at `configure`, matching the spec's explicit lifecycle note.
#[derive(Default)]
pub struct SdkTelemetry {
    upload_success_count: AtomicU64,
    upload_failure_count: AtomicU64,
    upload_retry_count: AtomicU64,
    circuit_breaker_open_count: AtomicU64,
    memory_eviction_count: AtomicU64,
    offline_persist_count: AtomicU64,
    bytes_uploaded: AtomicU64,
    bytes_evicted: AtomicU64,
    upload_duration_sum_ms: AtomicU64,
    upload_duration_samples: AtomicU64,
    last_upload_ms: AtomicU64,
    last_retry_ms: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkTelemetrySnapshot {
    pub upload_success_count: u64,
    pub upload_failure_count: u64,
    pub upload_retry_count: u64,
    pub circuit_breaker_open_count: u64,
    pub memory_eviction_count: u64,
    pub offline_persist_count: u64,
    pub bytes_uploaded: u64,
    pub bytes_evicted: u64,
    pub average_upload_duration_ms: f64,
    pub last_upload_ms: u64,
    pub last_retry_ms: u64,
    pub queue_depth: u64,
}

impl SdkTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_upload_success(&self, bytes: u64, duration_ms: u64, now_ms: u64) {
        self.upload_success_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
        self.upload_duration_sum_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.upload_duration_samples.fetch_add(1, Ordering::Relaxed);
        self.last_upload_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn record_upload_failure(&self) {
        self.upload_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self, now_ms: u64) {
        self.upload_retry_count.fetch_add(1, Ordering::Relaxed);
        self.last_retry_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_open(&self) {
        self.circuit_breaker_open_count
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_eviction(&self, bytes_evicted: u64) {
        self.memory_eviction_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_evicted.fetch_add(bytes_evicted, Ordering::Relaxed);
    }

    pub fn record_offline_persist(&self) {
        self.offline_persist_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_depth: u64) -> SdkTelemetrySnapshot {
        let samples = self.upload_duration_samples.load(Ordering::Relaxed);
        let sum = self.upload_duration_sum_ms.load(Ordering::Relaxed);
        let average_upload_duration_ms = if samples == 0 {
            0.0
        } else {
            sum as f64 / samples as f64
        };

        SdkTelemetrySnapshot {
            upload_success_count: self.upload_success_count.load(Ordering::Relaxed),
            upload_failure_count: self.upload_failure_count.load(Ordering::Relaxed),
            upload_retry_count: self.upload_retry_count.load(Ordering::Relaxed),
            circuit_breaker_open_count: self.circuit_breaker_open_count.load(Ordering::Relaxed),
            memory_eviction_count: self.memory_eviction_count.load(Ordering::Relaxed),
            offline_persist_count: self.offline_persist_count.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_evicted: self.bytes_evicted.load(Ordering::Relaxed),
            average_upload_duration_ms,
            last_upload_ms: self.last_upload_ms.load(Ordering::Relaxed),
            last_retry_ms: self.last_retry_ms.load(Ordering::Relaxed),
            queue_depth,
        }
    }

    pub fn reset(&self) {
        self.upload_success_count.store(0, Ordering::Relaxed);
        self.upload_failure_count.store(0, Ordering::Relaxed);
        self.upload_retry_count.store(0, Ordering::Relaxed);
        self.circuit_breaker_open_count.store(0, Ordering::Relaxed);
        self.memory_eviction_count.store(0, Ordering::Relaxed);
        self.offline_persist_count.store(0, Ordering::Relaxed);
        self.bytes_uploaded.store(0, Ordering::Relaxed);
        self.bytes_evicted.store(0, Ordering::Relaxed);
        self.upload_duration_sum_ms.store(0, Ordering::Relaxed);
        self.upload_duration_samples.store(0, Ordering::Relaxed);
        self.last_upload_ms.store(0, Ordering::Relaxed);
        self.last_retry_ms.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_upload_duration_across_samples() {
        let telemetry = SdkTelemetry::new();
        telemetry.record_upload_success(100, 10, 1_000);
        telemetry.record_upload_success(200, 30, 2_000);
        let snapshot = telemetry.snapshot(0);
        assert_eq!(snapshot.upload_success_count, 2);
        assert_eq!(snapshot.bytes_uploaded, 300);
        assert_eq!(snapshot.average_upload_duration_ms, 20.0);
        assert_eq!(snapshot.last_upload_ms, 2_000);
    }

    #[test]
    fn reset_clears_everything() {
        let telemetry = SdkTelemetry::new();
        telemetry.record_upload_success(100, 10, 1_000);
        telemetry.record_circuit_breaker_open();
        telemetry.reset();
        let snapshot = telemetry.snapshot(0);
        assert_eq!(snapshot.upload_success_count, 0);
        assert_eq!(snapshot.circuit_breaker_open_count, 0);
    }
}
