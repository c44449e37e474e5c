use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use platform::{Clock, HttpMethod, HttpRequest, HttpTransport};
use sdk_common::wire::{
    self, CompleteRequest, CompleteResponse, PresignRequest, PresignResponse,
    RetentionEvaluateRequest, RetentionEvaluateResponse, SessionEndRequest,
};
use sdk_common::{AttemptPolicy, SdkTelemetry, TalliesSnapshot};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::circuit_breaker::CircuitBreaker;
use crate::queue::PendingUpload;
use crate::rate_limit::SessionRateLimiter;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub max_pending_batches: usize,
    pub worker_concurrency: usize,
    pub circuit_breaker_threshold: u64,
    pub circuit_breaker_cooldown_ms: u64,
    pub retry_rate_per_second: std::num::NonZeroU32,
    pub retry_rate_burst: std::num::NonZeroU32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            max_pending_batches: 50,
            worker_concurrency: 2,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown_ms: 60_000,
            retry_rate_per_second: std::num::NonZeroU32::new(2).unwrap(),
            retry_rate_burst: std::num::NonZeroU32::new(5).unwrap(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadOutcome {
    Success,
    BillingBlocked,
    Failed,
}

struct SessionCredentials {
    api_token: String,
    upload_credential: String,
}

/// C2: the networked upload pipeline (§4.2). Every public method swallows
/// its own errors and reports `false`/a neutral value rather than letting
/// anything escape into host code (§9's propagation policy) — callers only
/// ever see "did it ship" or "keep buffering".
pub struct SegmentDispatcher {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
    credentials: AsyncMutex<HashMap<String, SessionCredentials>>,
    billing_blocked: AtomicBool,
    breaker: CircuitBreaker,
    batch_sequence: AtomicU64,
    queue: AsyncMutex<VecDeque<PendingUpload>>,
    semaphore: Arc<Semaphore>,
    telemetry: AsyncMutex<HashMap<String, Arc<SdkTelemetry>>>,
    attempt_policy: AttemptPolicy,
    rate_limit: SessionRateLimiter,
}

impl SegmentDispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>, config: DispatcherConfig) -> Self {
        let breaker = CircuitBreaker::new(config.circuit_breaker_threshold, config.circuit_breaker_cooldown_ms);
        let semaphore = Arc::new(Semaphore::new(config.worker_concurrency));
        let attempt_policy = AttemptPolicy::new(config.max_attempts);
        let rate_limit = SessionRateLimiter::new(config.retry_rate_per_second, config.retry_rate_burst);
        Self {
            transport,
            clock,
            config,
            credentials: AsyncMutex::new(HashMap::new()),
            billing_blocked: AtomicBool::new(false),
            breaker,
            batch_sequence: AtomicU64::new(0),
            queue: AsyncMutex::new(VecDeque::new()),
            semaphore,
            telemetry: AsyncMutex::new(HashMap::new()),
            attempt_policy,
            rate_limit,
        }
    }

    /// Registers a session's auth credentials and resets its telemetry
    /// snapshot to zero (§4.2's lifecycle note: reset only at configure).
    pub async fn configure(&self, session_id: &str, api_token: &str, upload_credential: &str) {
        self.credentials.lock().await.insert(
            session_id.to_string(),
            SessionCredentials {
                api_token: api_token.to_string(),
                upload_credential: upload_credential.to_string(),
            },
        );
        self.telemetry
            .lock()
            .await
            .insert(session_id.to_string(), Arc::new(SdkTelemetry::new()));
    }

    /// Next batch number, unique per dispatcher instance for the lifetime of
    /// the process — not per session (Open Question 3 disposition).
    pub fn next_batch_number(&self) -> u64 {
        self.batch_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn telemetry_snapshot(&self, session_id: &str) -> Option<sdk_common::telemetry::SdkTelemetrySnapshot> {
        let telemetry = self.telemetry.lock().await;
        let queue_depth = self.queue.lock().await.len() as u64;
        telemetry.get(session_id).map(|t| t.snapshot(queue_depth))
    }

    /// Hands out the same `SdkTelemetry` instance the dispatcher records
    /// upload success/failure into, so other owners of telemetry-producing
    /// events (VisualCapture's memory evictions, StabilityMonitor's offline
    /// persists) accumulate into the one snapshot embedded in confirm and
    /// session-end calls (§4.2, §4.7).
    pub async fn telemetry_handle(&self, session_id: &str) -> Option<Arc<SdkTelemetry>> {
        self.telemetry.lock().await.get(session_id).cloned()
    }

    fn telemetry_for<'a>(
        map: &'a HashMap<String, Arc<SdkTelemetry>>,
        session_id: &str,
    ) -> Option<Arc<SdkTelemetry>> {
        map.get(session_id).cloned()
    }

    /// Submits a freshly produced batch. Returns `true` only once it has
    /// actually shipped (including a server `skipUpload`); `false` means the
    /// caller should keep buffering — either because of backpressure or
    /// because the upload was enqueued for a later retry.
    #[tracing::instrument(skip_all, fields(session_id = %upload.session_id, content_type = ?upload.content_type))]
    pub async fn submit(&self, upload: PendingUpload) -> bool {
        if self.billing_blocked.load(Ordering::Acquire) {
            return false;
        }

        {
            let queue = self.queue.lock().await;
            if queue.len() >= self.config.max_pending_batches {
                tracing::warn!(session_id = %upload.session_id, "dispatch queue at capacity, rejecting submission");
                metrics::counter!("rejourney_dispatch_rejected_total").increment(1);
                return false;
            }
        }

        match self.attempt_upload(&upload).await {
            UploadOutcome::Success => true,
            UploadOutcome::BillingBlocked => false,
            UploadOutcome::Failed => {
                self.maybe_requeue(upload).await;
                false
            }
        }
    }

    /// Drains the retry queue, as happens on `shipPending()` calls and
    /// orchestrator foreground transitions (§4.2).
    pub async fn ship_pending(&self) {
        let drained: Vec<PendingUpload> = {
            let mut queue = self.queue.lock().await;
            queue.drain(..).collect()
        };

        for upload in drained {
            if self.billing_blocked.load(Ordering::Acquire) {
                // Stop draining once billing is blocked; nothing else will ship.
                break;
            }
            if self.rate_limit.is_limited(&upload.session_id) {
                tracing::warn!(session_id = %upload.session_id, "retry rate limit hit, requeuing without attempt");
                metrics::counter!("rejourney_dispatch_rate_limited_total").increment(1);
                self.queue.lock().await.push_back(upload);
                continue;
            }
            match self.attempt_upload(&upload).await {
                UploadOutcome::Success | UploadOutcome::BillingBlocked => {}
                UploadOutcome::Failed => self.maybe_requeue(upload).await,
            }
        }
    }

    async fn maybe_requeue(&self, mut upload: PendingUpload) {
        upload.attempt += 1;
        if self.attempt_policy.should_retry(upload.attempt) {
            let now = self.clock.now_ms();
            if let Some(telemetry) = Self::telemetry_for(&*self.telemetry.lock().await, &upload.session_id) {
                telemetry.record_retry(now);
            }
            self.queue.lock().await.push_back(upload);
        } else {
            tracing::warn!(session_id = %upload.session_id, attempt = upload.attempt, "dropping upload after exhausting retries");
            metrics::counter!("rejourney_dispatch_dropped_total").increment(1);
        }
    }

    async fn attempt_upload(&self, upload: &PendingUpload) -> UploadOutcome {
        let now = self.clock.now_ms();
        if !self.breaker.can_upload_now(now) {
            return UploadOutcome::Failed;
        }

        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return UploadOutcome::Failed,
        };

        let telemetry_map = self.telemetry.lock().await;
        let Some(telemetry) = Self::telemetry_for(&telemetry_map, &upload.session_id) else {
            return UploadOutcome::Failed;
        };
        drop(telemetry_map);

        let credentials = self.credentials.lock().await;
        let Some(creds) = credentials.get(&upload.session_id) else {
            return UploadOutcome::Failed;
        };
        let (api_token, upload_credential) = (creds.api_token.clone(), creds.upload_credential.clone());
        drop(credentials);

        let outcome = self
            .run_three_step_upload(upload, &api_token, &upload_credential, &telemetry)
            .await;

        match outcome {
            UploadOutcome::Success => {
                self.breaker.record_success();
            }
            UploadOutcome::BillingBlocked => {
                self.billing_blocked.store(true, Ordering::Release);
            }
            UploadOutcome::Failed => {
                telemetry.record_upload_failure();
                let start = self.clock.now_ms();
                if self.breaker.record_failure(start) {
                    telemetry.record_circuit_breaker_open();
                }
            }
        }

        outcome
    }

    async fn run_three_step_upload(
        &self,
        upload: &PendingUpload,
        api_token: &str,
        upload_credential: &str,
        telemetry: &Arc<SdkTelemetry>,
    ) -> UploadOutcome {
        let headers = wire::auth_headers(api_token, upload_credential, &upload.session_id);
        let size_bytes = upload.payload.len() as u64;

        let presign_body = PresignRequest {
            session_id: upload.session_id.clone(),
            size_bytes,
            content_type: upload.content_type,
            start_time: upload.range_start,
            end_time: upload.range_end,
            item_count: upload.item_count,
            compression: "gzip",
            is_sampled_in: upload.is_sampled_in,
            batch_number: upload.batch_number,
        };
        let presign_json = match serde_json::to_vec(&presign_body) {
            Ok(bytes) => bytes,
            Err(_) => return UploadOutcome::Failed,
        };

        let presign_url = format!("{}{}", self.config.base_url, upload.content_type.presign_path());
        let mut presign_request = HttpRequest::new(HttpMethod::Post, presign_url).body(presign_json);
        for (k, v) in &headers {
            presign_request = presign_request.header(k, v);
        }

        let presign_response = match self.transport.execute(presign_request).await {
            Ok(response) => response,
            Err(_) => return UploadOutcome::Failed,
        };

        if presign_response.status == 402 {
            return UploadOutcome::BillingBlocked;
        }
        if !presign_response.is_success() {
            return UploadOutcome::Failed;
        }

        let presign: PresignResponse = match presign_response.json() {
            Ok(body) => body,
            Err(_) => return UploadOutcome::Failed,
        };

        if presign.skip_upload {
            return UploadOutcome::Success;
        }

        let (Some(presigned_url), Some(batch_id)) = (presign.presigned_url, presign.batch_id) else {
            return UploadOutcome::Failed;
        };

        let put_request = HttpRequest::new(HttpMethod::Put, presigned_url)
            .header("Content-Type", "application/gzip")
            .body(upload.payload.clone());
        let put_response = match self.transport.execute(put_request).await {
            Ok(response) => response,
            Err(_) => return UploadOutcome::Failed,
        };
        if !put_response.is_success() {
            return UploadOutcome::Failed;
        }

        let upload_start = self.clock.now_ms();
        let confirm_body = CompleteRequest {
            segment_id: batch_id,
            actual_size_bytes: size_bytes,
            timestamp: upload_start,
            count: upload.content_type.complete_count(upload.item_count),
            sdk_telemetry: telemetry.snapshot(self.queue.lock().await.len() as u64),
        };
        let confirm_json = match serde_json::to_vec(&confirm_body) {
            Ok(bytes) => bytes,
            Err(_) => return UploadOutcome::Failed,
        };

        let confirm_url = format!("{}{}", self.config.base_url, upload.content_type.complete_path());
        let mut confirm_request = HttpRequest::new(HttpMethod::Post, confirm_url).body(confirm_json);
        for (k, v) in &headers {
            confirm_request = confirm_request.header(k, v);
        }

        let confirm_response = match self.transport.execute(confirm_request).await {
            Ok(response) => response,
            Err(_) => return UploadOutcome::Failed,
        };
        if confirm_response.status != 200 {
            return UploadOutcome::Failed;
        }
        let _: CompleteResponse = confirm_response.json().unwrap_or(CompleteResponse {});

        let duration_ms = self.clock.now_ms().saturating_sub(upload_start);
        telemetry.record_upload_success(size_bytes, duration_ms, self.clock.now_ms());

        UploadOutcome::Success
    }

    /// `/api/ingest/session/end` — posts the final tallies and telemetry
    /// snapshot for a session (§4.2).
    pub async fn conclude_replay(
        &self,
        session_id: &str,
        ended_at: u64,
        background_duration_ms: u64,
        metrics: TalliesSnapshot,
        queue_depth: u64,
    ) -> bool {
        let telemetry_map = self.telemetry.lock().await;
        let Some(telemetry) = Self::telemetry_for(&telemetry_map, session_id) else {
            return false;
        };
        drop(telemetry_map);

        let credentials = self.credentials.lock().await;
        let Some(creds) = credentials.get(session_id) else {
            return false;
        };
        let headers = wire::auth_headers(&creds.api_token, &creds.upload_credential, session_id);
        drop(credentials);

        let body = SessionEndRequest {
            session_id: session_id.to_string(),
            ended_at,
            background_duration_ms,
            metrics,
            queue_depth,
            sdk_telemetry: telemetry.snapshot(queue_depth),
        };
        let json = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let url = format!("{}/api/ingest/session/end", self.config.base_url);
        let mut request = HttpRequest::new(HttpMethod::Post, url).body(json);
        for (k, v) in &headers {
            request = request.header(k, v);
        }

        matches!(self.transport.execute(request).await, Ok(response) if response.is_success())
    }

    /// `/api/ingest/replay/evaluate` (§4.2). Returns `None` on any failure —
    /// the orchestrator treats that as "don't promote".
    pub async fn evaluate_replay_retention(
        &self,
        session_id: &str,
        metrics: TalliesSnapshot,
        duration_ms: u64,
    ) -> Option<RetentionEvaluateResponse> {
        let credentials = self.credentials.lock().await;
        let creds = credentials.get(session_id)?;
        let headers = wire::auth_headers(&creds.api_token, &creds.upload_credential, session_id);
        drop(credentials);

        let body = RetentionEvaluateRequest {
            session_id: session_id.to_string(),
            metrics,
            duration_ms,
        };
        let json = serde_json::to_vec(&body).ok()?;

        let url = format!("{}/api/ingest/replay/evaluate", self.config.base_url);
        let mut request = HttpRequest::new(HttpMethod::Post, url).body(json);
        for (k, v) in &headers {
            request = request.header(k, v);
        }

        let response = self.transport.execute(request).await.ok()?;
        if !response.is_success() {
            return None;
        }
        response.json().ok()
    }

    pub async fn queue_depth(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// For callers outside any tokio runtime (diagnostics snapshots taken
    /// from a plain host thread). Panics if called from async context.
    pub fn queue_depth_blocking(&self) -> usize {
        self.queue.blocking_lock().len()
    }

    pub fn billing_blocked(&self) -> bool {
        self.billing_blocked.load(Ordering::Acquire)
    }
}
