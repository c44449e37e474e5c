use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anr_sentinel::{AnrReport, AnrSentinel};
use event_buffer::EventBuffer;
use health::{ComponentStatus, HealthHandle, HealthRegistry, HealthStatus};
use interaction_recorder::InteractionRecorder;
use platform::{
    Clock, HttpTransport, MainThreadExecutor, MainThreadStackProvider, MapIdleSource, PixelCopyProvider,
    ScreenSurface, TextFieldWatcher, TouchIntake, UncaughtHandlerInstaller, ViewHierarchyProvider,
    WindowFrameObserver,
};
use sdk_common::wire::{ContentType, RetentionEvaluateResponse};
use sdk_common::{Event, EventKind, Tallies};
use segment_dispatcher::{PendingUpload, SegmentDispatcher};
use serde_json::json;
use stability_monitor::{FaultUploader, IncidentStore, StabilityMonitor};
use time::Duration as TimeDuration;
use tokio::sync::{mpsc, oneshot};
use visual_capture::{CaptureConfig, VisualCapture};

use crate::batch::encode_event_batch;
use crate::config::ReplayConfig;

struct BatchJob {
    session_id: String,
    batch_number: u64,
    events: Vec<Event>,
}

struct SessionState {
    session_id: String,
    epoch_ms: u64,
    background_since_ms: Option<u64>,
    background_duration_ms: u64,
}

fn route_event(
    event_buffer: &EventBuffer,
    event_batch: &Mutex<Vec<Event>>,
    batch_tx: &mpsc::UnboundedSender<BatchJob>,
    dispatcher: &SegmentDispatcher,
    batch_size: usize,
    event: Event,
) {
    event_buffer.append_event(&event);

    let mut guard = event_batch.lock().unwrap();
    guard.push(event);
    if guard.len() >= batch_size {
        let drained = std::mem::take(&mut *guard);
        let session_id = drained.last().map(|e| e.session_id.clone()).unwrap_or_default();
        drop(guard);
        let batch_number = dispatcher.next_batch_number();
        if let Err(err) = batch_tx.send(BatchJob { session_id, batch_number, events: drained }) {
            tracing::error!(error = %err, "batch drain task is gone, dropping event batch");
        }
    }
}

/// The single control plane the host bridge drives: wires together the
/// event log, the dispatcher, visual capture, and the three C4/C5/C6
/// reporting components, and owns the session lifecycle state machine
/// (§4.7). Plays the role `hook-janitor::main`/`hook-worker::main` play in
/// the teacher — the one place that composes independently-built workers
/// into a running process, including their graceful shutdown.
pub struct ReplayOrchestrator {
    config: ReplayConfig,
    cache_root: PathBuf,
    api_token: String,
    clock: Arc<dyn Clock>,
    event_buffer: Arc<EventBuffer>,
    dispatcher: Arc<SegmentDispatcher>,
    capture: Arc<VisualCapture>,
    stability: Arc<StabilityMonitor>,
    anr: Arc<AnrSentinel>,
    interaction: Arc<InteractionRecorder>,
    tallies: Arc<Tallies>,
    health: HealthRegistry,
    event_batch: Arc<Mutex<Vec<Event>>>,
    batch_tx: mpsc::UnboundedSender<BatchJob>,
    session: Mutex<Option<SessionState>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ReplayOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        config: ReplayConfig,
        cache_root: impl Into<PathBuf>,
        api_token: impl Into<String>,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn HttpTransport>,
        screen: Arc<dyn ScreenSurface>,
        hierarchy_provider: Arc<dyn ViewHierarchyProvider>,
        pixel_copy: Arc<dyn PixelCopyProvider>,
        map_idle: Arc<dyn MapIdleSource>,
        uncaught_installer: Arc<dyn UncaughtHandlerInstaller>,
        main_thread: Arc<dyn MainThreadExecutor>,
        main_thread_stack: Arc<dyn MainThreadStackProvider>,
        touch_intake: Arc<dyn TouchIntake>,
        window_frame: Option<Arc<dyn WindowFrameObserver>>,
        text_fields: Option<Arc<dyn TextFieldWatcher>>,
    ) -> Arc<Self> {
        let cache_root = cache_root.into();
        let api_token = api_token.into();

        let event_buffer = Arc::new(EventBuffer::new(cache_root.clone()));
        let dispatcher = Arc::new(SegmentDispatcher::new(
            transport.clone(),
            clock.clone(),
            config.dispatcher.to_dispatcher_config(config.base_url.clone()),
        ));

        let capture_config: CaptureConfig = config.capture.to_capture_config();
        let capture = Arc::new(VisualCapture::new(
            screen,
            hierarchy_provider,
            pixel_copy,
            map_idle,
            clock.clone(),
            dispatcher.clone(),
            capture_config,
        ));

        let tallies = Arc::new(Tallies::new());
        let incident_store = Arc::new(IncidentStore::new(cache_root.clone()));
        let event_batch: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
        let (batch_tx, mut batch_rx) = mpsc::unbounded_channel::<BatchJob>();

        {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                while let Some(job) = batch_rx.recv().await {
                    match encode_event_batch(&job.events) {
                        Ok(payload) => {
                            let range_start = job.events.first().map(|e| e.timestamp_ms).unwrap_or(0);
                            let range_end = job.events.last().map(|e| e.timestamp_ms).unwrap_or(0);
                            let upload = PendingUpload::new(
                                job.session_id.clone(),
                                ContentType::Events,
                                payload,
                                range_start,
                                range_end,
                                job.events.len() as u64,
                                Some(job.batch_number),
                                true,
                            );
                            dispatcher.submit(upload).await;
                        }
                        Err(err) => {
                            tracing::error!(session_id = %job.session_id, error = %err, "failed to encode event batch");
                        }
                    }
                }
            });
        }

        let on_anr: Arc<dyn Fn(AnrReport) + Send + Sync> = {
            let event_buffer = event_buffer.clone();
            let event_batch = event_batch.clone();
            let batch_tx = batch_tx.clone();
            let dispatcher = dispatcher.clone();
            let batch_size = config.event_batch_size;
            Arc::new(move |report: AnrReport| {
                let event = Event::new(
                    EventKind::Anr,
                    report.timestamp_ms,
                    report.session_id.clone(),
                    json!({"durationMs": report.duration_ms, "frames": report.frames}),
                );
                route_event(&event_buffer, &event_batch, &batch_tx, &dispatcher, batch_size, event);
            })
        };

        let anr = Arc::new(AnrSentinel::new(
            main_thread,
            main_thread_stack,
            clock.clone(),
            incident_store.clone(),
            tallies.clone(),
            config.anr.threshold_ms,
            on_anr,
        ));

        let stability = Arc::new(StabilityMonitor::new(
            uncaught_installer,
            incident_store.clone(),
            tallies.clone(),
            Arc::new({
                let clock = clock.clone();
                move || clock.now_ms()
            }),
        ));

        let on_event: Arc<dyn Fn(Event) + Send + Sync> = {
            let event_buffer = event_buffer.clone();
            let event_batch = event_batch.clone();
            let batch_tx = batch_tx.clone();
            let dispatcher = dispatcher.clone();
            let batch_size = config.event_batch_size;
            Arc::new(move |event: Event| {
                route_event(&event_buffer, &event_batch, &batch_tx, &dispatcher, batch_size, event);
            })
        };
        let on_navigation: Arc<dyn Fn() + Send + Sync> = {
            let capture = capture.clone();
            Arc::new(move || {
                capture.tick(true);
            })
        };

        let interaction = Arc::new(InteractionRecorder::new(
            touch_intake,
            window_frame,
            text_fields,
            tallies.clone(),
            clock.clone(),
            on_event,
            on_navigation,
        ));

        let fault_uploader = Arc::new(FaultUploader::new(
            transport,
            incident_store,
            config.base_url.clone(),
            api_token.clone(),
        ));

        let health = HealthRegistry::new("rejourney-replay");
        let fault_deadline = TimeDuration::milliseconds(config.fault_upload_interval_ms.0.as_millis() as i64 * 3);
        let fault_health = health.register("fault-uploader".to_string(), fault_deadline).await;
        let dispatch_health = health
            .register("dispatch-worker-pool".to_string(), TimeDuration::seconds(30))
            .await;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        spawn_fault_upload_worker(fault_uploader, config.fault_upload_interval_ms.0, shutdown_rx, fault_health);
        spawn_dispatch_health_poller(dispatcher.clone(), dispatch_health, StdDuration::from_secs(10));

        Arc::new(Self {
            config,
            cache_root,
            api_token,
            clock,
            event_buffer,
            dispatcher,
            capture,
            stability,
            anr,
            interaction,
            tallies,
            health,
            event_batch,
            batch_tx,
            session: Mutex::new(None),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        })
    }

    fn route_event(&self, event: Event) {
        route_event(
            &self.event_buffer,
            &self.event_batch,
            &self.batch_tx,
            &self.dispatcher,
            self.config.event_batch_size,
            event,
        );
    }

    /// `startSession(cfg)` (§4.7): assigns or accepts a session id, wires
    /// every component into the session, and begins capture.
    pub async fn start_session(&self, session_id: Option<String>, upload_credential: impl Into<String>) -> String {
        let session_id = session_id.unwrap_or_else(sdk_common::ids::new_session_id);
        let now = self.clock.now_ms();

        self.tallies.reset();
        self.event_batch.lock().unwrap().clear();
        *self.session.lock().unwrap() = Some(SessionState {
            session_id: session_id.clone(),
            epoch_ms: now,
            background_since_ms: None,
            background_duration_ms: 0,
        });

        self.event_buffer.configure(&session_id);
        self.dispatcher
            .configure(&session_id, &self.api_token, &upload_credential.into())
            .await;
        self.capture.begin_capture(&session_id, now).await;
        self.stability.activate(session_id.clone());
        self.anr.activate(session_id.clone());
        self.interaction.activate(session_id.clone());

        self.route_event(Event::new(EventKind::SessionStart, now, session_id.clone(), json!({})));

        session_id
    }

    /// The host's UI-thread timer tick driving visual capture (§4.3, §5).
    pub fn tick_capture(&self, force: bool) -> bool {
        self.capture.tick(force)
    }

    pub fn should_flush_capture(&self) -> bool {
        self.capture.should_flush()
    }

    pub fn register_sensitive_view(&self, view_id: impl Into<String>) {
        self.capture.register_sensitive_view(view_id);
    }

    pub fn register_text_field(&self, field_id: &str, masked: bool, hint: &str) {
        self.interaction.register_text_field(field_id, masked, hint);
    }

    pub fn push_screen(&self, id: impl Into<String>) {
        self.interaction.push_screen(id);
    }

    pub fn pop_screen(&self) {
        self.interaction.pop_screen();
    }

    /// App came to the foreground: drains whatever the dispatcher queued
    /// while backgrounded (§4.7).
    pub async fn on_foreground(&self) {
        if let Some(state) = self.session.lock().unwrap().as_mut() {
            if let Some(since) = state.background_since_ms.take() {
                state.background_duration_ms += self.clock.now_ms().saturating_sub(since);
            }
        }
        self.dispatcher.ship_pending().await;
    }

    /// App went to the background: the session stays alive, but the
    /// in-memory visual buffer is flushed synchronously rather than left to
    /// grow while the host process may be frozen or killed (§4.7).
    pub async fn on_background(&self) -> bool {
        if let Some(state) = self.session.lock().unwrap().as_mut() {
            if state.background_since_ms.is_none() {
                state.background_since_ms = Some(self.clock.now_ms());
            }
        }
        self.capture.flush_buffer_to_network().await
    }

    /// `stopSession()` (§4.7). StabilityMonitor is deliberately left active
    /// past this point to catch a crash in the window right after the host
    /// app decides to stop recording.
    pub async fn stop_session(&self) -> Option<RetentionEvaluateResponse> {
        let state = self.session.lock().unwrap().take()?;

        self.capture.halt(&self.cache_root);
        self.anr.deactivate();
        self.interaction.deactivate();

        {
            let remaining = std::mem::take(&mut *self.event_batch.lock().unwrap());
            if !remaining.is_empty() {
                let batch_number = self.dispatcher.next_batch_number();
                if let Err(err) = self.batch_tx.send(BatchJob {
                    session_id: state.session_id.clone(),
                    batch_number,
                    events: remaining,
                }) {
                    tracing::error!(error = %err, "batch drain task is gone, dropping final event batch");
                }
            }
        }
        self.event_buffer.shutdown();

        let ended_at = self.clock.now_ms();
        let duration_ms = ended_at.saturating_sub(state.epoch_ms);
        let metrics = self.tallies.snapshot();
        let queue_depth = self.dispatcher.queue_depth().await as u64;

        self.dispatcher
            .conclude_replay(&state.session_id, ended_at, state.background_duration_ms, metrics.clone(), queue_depth)
            .await;

        let retention = self
            .dispatcher
            .evaluate_replay_retention(&state.session_id, metrics, duration_ms)
            .await;
        if let Some(decision) = &retention {
            tracing::info!(
                session_id = %state.session_id,
                promoted = decision.promoted,
                reason = %decision.reason,
                "replay retention decision"
            );
        }

        retention
    }

    /// Synchronously flushes the active video segment and the event log,
    /// for callers that can't await a full `stopSession` (e.g. a crash
    /// handler or a host-driven emergency teardown) (§4.7).
    pub async fn emergency_flush(&self) -> bool {
        let capture_ok = self.capture.flush_buffer_to_network().await;
        let buffer_ok = self.event_buffer.flush();
        capture_ok && buffer_ok
    }

    /// Enumerates sessions left behind by a prior process crash and
    /// replays their buffered events through the dispatcher, clearing the
    /// on-disk state only once the replay is accepted (§4.7).
    pub async fn recover_pending_sessions(&self, upload_credential: impl Into<String> + Clone) -> Vec<String> {
        let mut recovered = Vec::new();
        for session_id in self.event_buffer.get_pending_sessions() {
            let events = self.event_buffer.read_pending_events(&session_id);
            if events.is_empty() {
                continue;
            }

            self.dispatcher
                .configure(&session_id, &self.api_token, &upload_credential.clone().into())
                .await;

            let Ok(payload) = encode_event_batch(&events) else {
                continue;
            };
            let range_start = events.first().map(|e| e.timestamp_ms).unwrap_or(0);
            let range_end = events.last().map(|e| e.timestamp_ms).unwrap_or(0);
            let upload = PendingUpload::new(
                session_id.clone(),
                ContentType::Events,
                payload,
                range_start,
                range_end,
                events.len() as u64,
                Some(self.dispatcher.next_batch_number()),
                true,
            );

            if self.dispatcher.submit(upload).await {
                self.event_buffer.clear_session(&session_id);
                recovered.push(session_id);
            }
        }
        recovered
    }

    /// Recovers frames `VisualCapture::halt` persisted to disk for a crashed
    /// session and replays them as a single bundle (§4.3, §4.7).
    pub async fn recover_pending_frames(&self, session_id: &str, upload_credential: impl Into<String>) -> bool {
        let frames_dir = self.cache_root.join("rj_pending").join(session_id).join("frames");
        let Ok(recovered) = visual_capture::recover_pending_frames(&frames_dir) else {
            return false;
        };
        if recovered.is_empty() {
            return true;
        }

        self.dispatcher
            .configure(session_id, &self.api_token, &upload_credential.into())
            .await;

        let (paths, frames): (Vec<_>, Vec<_>) = recovered.into_iter().unzip();
        let epoch = frames.first().map(|f| f.captured_at_ms).unwrap_or(0);
        let Ok(bundle) = visual_capture::encode_frame_bundle(&frames, epoch) else {
            return false;
        };
        let range_start = frames.first().map(|f| f.captured_at_ms).unwrap_or(0);
        let range_end = frames.last().map(|f| f.captured_at_ms).unwrap_or(0);

        let upload = PendingUpload::new(
            session_id,
            ContentType::Screenshots,
            bundle,
            range_start,
            range_end,
            frames.len() as u64,
            Some(self.dispatcher.next_batch_number()),
            true,
        );

        if !self.dispatcher.submit(upload).await {
            return false;
        }
        for path in &paths {
            if let Err(err) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove recovered frame file");
            }
        }
        true
    }

    pub fn health_snapshot(&self) -> HealthStatus {
        self.health.get_status()
    }

    /// Full SDK teardown, distinct from `stop_session`: stops the fault
    /// upload worker and deactivates the crash handler. Not called between
    /// sessions.
    pub fn shutdown(&self) {
        self.stability.deactivate();
        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }
}

fn spawn_fault_upload_worker(
    uploader: Arc<FaultUploader>,
    interval: StdDuration,
    mut shutdown: oneshot::Receiver<()>,
    health: HealthHandle,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    uploader.upload_pending().await;
                    health.report_healthy().await;
                }
                _ = &mut shutdown => {
                    tracing::info!("fault upload worker shutting down");
                    break;
                }
            }
        }
    });
}

/// Billing-block is the one condition under which the dispatcher's worker
/// pool genuinely stops being useful for the rest of the process lifetime,
/// so it's the signal this poller reports as unhealthy — ordinary queue
/// backlog or an open circuit breaker are transient and not worth paging on.
fn spawn_dispatch_health_poller(dispatcher: Arc<SegmentDispatcher>, health: HealthHandle, interval: StdDuration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if dispatcher.billing_blocked() {
                health.report_status(ComponentStatus::Unhealthy).await;
            } else {
                health.report_healthy().await;
            }
        }
    });
}
