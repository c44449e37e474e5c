use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

/// Milliseconds-from-env newtype, following the teacher's
/// `hook-worker::config::EnvMsDuration` — parsed as a plain integer rather
/// than `humantime`'s `"5s"` syntax, since that's what the host bridges
/// embedding this SDK already pass through their own config layers.
#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;
        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}

#[derive(Envconfig, Clone)]
pub struct DispatcherEnvConfig {
    #[envconfig(from = "REJOURNEY_CONNECT_TIMEOUT_MS", default = "5000")]
    pub connect_timeout_ms: EnvMsDuration,

    #[envconfig(from = "REJOURNEY_REQUEST_TIMEOUT_MS", default = "10000")]
    pub request_timeout_ms: EnvMsDuration,

    #[envconfig(from = "REJOURNEY_MAX_ATTEMPTS", default = "3")]
    pub max_attempts: u32,

    #[envconfig(from = "REJOURNEY_MAX_PENDING_BATCHES", default = "50")]
    pub max_pending_batches: usize,

    #[envconfig(from = "REJOURNEY_WORKER_CONCURRENCY", default = "2")]
    pub worker_concurrency: usize,

    #[envconfig(from = "REJOURNEY_CIRCUIT_BREAKER_THRESHOLD", default = "5")]
    pub circuit_breaker_threshold: u64,

    #[envconfig(from = "REJOURNEY_CIRCUIT_BREAKER_COOLDOWN_MS", default = "60000")]
    pub circuit_breaker_cooldown_ms: u64,

    #[envconfig(from = "REJOURNEY_RETRY_RATE_PER_SECOND", default = "2")]
    pub retry_rate_per_second: u32,

    #[envconfig(from = "REJOURNEY_RETRY_RATE_BURST", default = "5")]
    pub retry_rate_burst: u32,
}

impl DispatcherEnvConfig {
    pub fn to_dispatcher_config(&self, base_url: String) -> segment_dispatcher::DispatcherConfig {
        segment_dispatcher::DispatcherConfig {
            base_url,
            connect_timeout: self.connect_timeout_ms.0,
            request_timeout: self.request_timeout_ms.0,
            max_attempts: self.max_attempts,
            max_pending_batches: self.max_pending_batches,
            worker_concurrency: self.worker_concurrency,
            circuit_breaker_threshold: self.circuit_breaker_threshold,
            circuit_breaker_cooldown_ms: self.circuit_breaker_cooldown_ms,
            retry_rate_per_second: std::num::NonZeroU32::new(self.retry_rate_per_second)
                .unwrap_or(std::num::NonZeroU32::new(2).unwrap()),
            retry_rate_burst: std::num::NonZeroU32::new(self.retry_rate_burst)
                .unwrap_or(std::num::NonZeroU32::new(5).unwrap()),
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct CaptureEnvConfig {
    #[envconfig(from = "REJOURNEY_SNAPSHOT_INTERVAL_MS", default = "1000")]
    pub snapshot_interval_ms: u64,

    #[envconfig(from = "REJOURNEY_CAPTURE_SCALE", default = "0.8")]
    pub scale: f32,

    #[envconfig(from = "REJOURNEY_CAPTURE_MAX_DIMENSION", default = "1280")]
    pub max_dimension: u32,

    #[envconfig(from = "REJOURNEY_JPEG_QUALITY", default = "0.5")]
    pub jpeg_quality: f32,

    #[envconfig(from = "REJOURNEY_CAPTURE_BATCH_SIZE", default = "20")]
    pub batch_size: usize,

    #[envconfig(from = "REJOURNEY_MAX_BUFFERED_SCREENSHOTS", default = "500")]
    pub max_buffered_screenshots: usize,

    #[envconfig(from = "REJOURNEY_HIERARCHY_EVERY_N_TICKS", default = "5")]
    pub hierarchy_every_n_ticks: u32,

    #[envconfig(from = "REJOURNEY_VIEW_TREE_DEPTH_CAP", default = "40")]
    pub view_tree_depth_cap: usize,

    #[envconfig(from = "REJOURNEY_MASK_REFRESH_INTERVAL_MS", default = "500")]
    pub mask_refresh_interval_ms: u64,
}

impl CaptureEnvConfig {
    pub fn to_capture_config(&self) -> visual_capture::CaptureConfig {
        visual_capture::CaptureConfig {
            snapshot_interval_ms: self.snapshot_interval_ms,
            scale: self.scale,
            max_dimension: self.max_dimension,
            jpeg_quality: self.jpeg_quality,
            batch_size: self.batch_size,
            max_buffered_screenshots: self.max_buffered_screenshots,
            hierarchy_every_n_ticks: self.hierarchy_every_n_ticks,
            view_tree_depth_cap: self.view_tree_depth_cap,
            mask_refresh_interval_ms: self.mask_refresh_interval_ms,
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct AnrEnvConfig {
    #[envconfig(from = "REJOURNEY_ANR_THRESHOLD_MS", default = "5000")]
    pub threshold_ms: u64,
}

/// The workspace's single top-level configuration type (§10.2), built the
/// way the teacher's `capture::config::Config` and `hook-worker::config::Config`
/// are: one `#[derive(Envconfig)]` struct with nested sub-configs. Host
/// bridges that embed the SDK programmatically construct this with
/// `ReplayConfig::default()` plus field assignment instead of
/// `init_from_env` — env config is for the `demos/` harness, not a
/// requirement of embedding.
#[derive(Envconfig, Clone)]
pub struct ReplayConfig {
    #[envconfig(from = "REJOURNEY_BASE_URL", default = "https://ingest.rejourney.io")]
    pub base_url: String,

    #[envconfig(from = "REJOURNEY_EVENT_BATCH_SIZE", default = "20")]
    pub event_batch_size: usize,

    #[envconfig(from = "REJOURNEY_FAULT_UPLOAD_INTERVAL_MS", default = "30000")]
    pub fault_upload_interval_ms: EnvMsDuration,

    #[envconfig(nested = true)]
    pub dispatcher: DispatcherEnvConfig,

    #[envconfig(nested = true)]
    pub capture: CaptureEnvConfig,

    #[envconfig(nested = true)]
    pub anr: AnrEnvConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self::init_from_hashmap(&std::collections::HashMap::new())
            .expect("every field has a default, so an empty env map always resolves")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_component_defaults() {
        let config = ReplayConfig::default();
        assert_eq!(config.base_url, "https://ingest.rejourney.io");
        assert_eq!(config.event_batch_size, 20);
        assert_eq!(config.anr.threshold_ms, 5000);

        let dispatcher = config.dispatcher.to_dispatcher_config(config.base_url.clone());
        assert_eq!(dispatcher.max_attempts, 3);
        assert_eq!(dispatcher.circuit_breaker_threshold, 5);

        let capture = config.capture.to_capture_config();
        assert_eq!(capture.batch_size, 20);
        assert_eq!(capture.max_buffered_screenshots, 500);
    }

    #[test]
    fn env_overrides_take_effect() {
        let mut env = std::collections::HashMap::new();
        env.insert("REJOURNEY_BASE_URL".to_string(), "https://staging.example".to_string());
        env.insert("REJOURNEY_ANR_THRESHOLD_MS".to_string(), "8000".to_string());
        let config = ReplayConfig::init_from_hashmap(&env).unwrap();
        assert_eq!(config.base_url, "https://staging.example");
        assert_eq!(config.anr.threshold_ms, 8000);
    }
}
