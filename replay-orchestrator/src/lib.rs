//! C7 — ReplayOrchestrator: the top-level facade that composes the rest of
//! the workspace into a running agent and owns the session state machine
//! (§4.7). The host bridge (Android/iOS/RN glue, not part of this
//! workspace) is the only caller of this crate's public API.

mod batch;
mod config;
mod orchestrator;

pub use batch::encode_event_batch;
pub use config::{AnrEnvConfig, CaptureEnvConfig, DispatcherEnvConfig, EnvMsDuration, ReplayConfig};
pub use orchestrator::ReplayOrchestrator;

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use platform::{
        CapturedBitmap, Clock, FakeClock, HostThrowable, HttpRequest, HttpResponse, HttpTransport,
        MainThreadExecutor, MainThreadStackProvider, MapIdleSource, ObserverHandle, PixelCopyProvider,
        PreviousHandler, Rect, ScreenSurface, TextFieldWatcher, TouchEvent, TouchIntake, TransportError,
        UncaughtHandlerInstaller, ViewHierarchyProvider, ViewNode, WindowBounds, WindowFrameObserver,
    };

    struct FakeScreen {
        bounds: WindowBounds,
    }

    impl ScreenSurface for FakeScreen {
        fn bounds(&self) -> WindowBounds {
            self.bounds
        }

        fn render_bitmap(&self, scale: f32, max_dimension: u32) -> Option<CapturedBitmap> {
            let w = ((self.bounds.width as f32 * scale) as u32).min(max_dimension).max(1);
            let h = ((self.bounds.height as f32 * scale) as u32).min(max_dimension).max(1);
            Some(CapturedBitmap { width: w, height: h, rgba: vec![128u8; (w * h * 4) as usize] })
        }
    }

    struct FakeHierarchy {
        tree: ViewNode,
    }

    impl ViewHierarchyProvider for FakeHierarchy {
        fn snapshot(&self, _depth_cap: usize) -> ViewNode {
            self.tree.clone()
        }
    }

    struct FakePixelCopy;

    impl PixelCopyProvider for FakePixelCopy {
        fn read_back(&self, _node: &ViewNode) -> Option<CapturedBitmap> {
            None
        }
    }

    struct FakeMapIdle;

    impl MapIdleSource for FakeMapIdle {
        fn is_camera_idle(&self) -> bool {
            true
        }

        fn on_next_idle(&self, _callback: Box<dyn Fn() + Send + Sync>) -> ObserverHandle {
            ObserverHandle::noop()
        }
    }

    struct FakeInstaller {
        installed: Mutex<Option<Box<dyn Fn(HostThrowable) + Send + Sync>>>,
    }

    impl UncaughtHandlerInstaller for FakeInstaller {
        fn install(&self, handler: Box<dyn Fn(HostThrowable) + Send + Sync>) -> Option<PreviousHandler> {
            *self.installed.lock().unwrap() = Some(handler);
            None
        }

        fn restore(&self, _previous: Option<PreviousHandler>) {
            *self.installed.lock().unwrap() = None;
        }
    }

    struct FakeMainThread;

    impl MainThreadExecutor for FakeMainThread {
        fn post(&self, job: Box<dyn FnOnce() + Send>) -> bool {
            job();
            true
        }
    }

    struct FakeStack;

    impl MainThreadStackProvider for FakeStack {
        fn capture_stack(&self) -> Vec<String> {
            vec!["Main.kt:1".to_string()]
        }
    }

    struct FakeTouchIntake {
        callback: Mutex<Option<Box<dyn Fn(TouchEvent) + Send + Sync>>>,
    }

    impl FakeTouchIntake {
        fn new() -> Self {
            Self { callback: Mutex::new(None) }
        }

        fn fire(&self, event: TouchEvent) {
            if let Some(cb) = self.callback.lock().unwrap().as_ref() {
                cb(event);
            }
        }
    }

    impl TouchIntake for FakeTouchIntake {
        fn install(&self, callback: Box<dyn Fn(TouchEvent) + Send + Sync>) -> ObserverHandle {
            *self.callback.lock().unwrap() = Some(callback);
            ObserverHandle::noop()
        }
    }

    struct NullTransport {
        calls: AtomicU64,
    }

    #[async_trait]
    impl HttpTransport for NullTransport {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse {
                status: 200,
                body: bytes::Bytes::from_static(b"{\"skipUpload\":true,\"promoted\":true,\"reason\":\"active session\"}"),
            })
        }
    }

    async fn harness() -> (Arc<ReplayOrchestrator>, tempfile::TempDir, Arc<FakeTouchIntake>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FakeClock::new(10_000));
        let touch_intake = Arc::new(FakeTouchIntake::new());

        let mut config = ReplayConfig::default();
        config.event_batch_size = 2;

        let tree = ViewNode {
            id: "root".into(),
            rect: Rect { x: 0.0, y: 0.0, width: 400.0, height: 800.0 },
            ..Default::default()
        };

        let orchestrator = ReplayOrchestrator::new(
            config,
            dir.path(),
            "api-token",
            clock.clone() as Arc<dyn Clock>,
            Arc::new(NullTransport { calls: AtomicU64::new(0) }),
            Arc::new(FakeScreen { bounds: WindowBounds { width: 400, height: 800 } }),
            Arc::new(FakeHierarchy { tree }),
            Arc::new(FakePixelCopy),
            Arc::new(FakeMapIdle),
            Arc::new(FakeInstaller { installed: Mutex::new(None) }),
            Arc::new(FakeMainThread),
            Arc::new(FakeStack),
            Arc::clone(&touch_intake) as Arc<dyn TouchIntake>,
            None,
            None::<Arc<dyn TextFieldWatcher>>,
        )
        .await;

        (orchestrator, dir, touch_intake)
    }

    #[tokio::test]
    async fn start_session_activates_every_component() {
        let (orchestrator, _dir, _touch) = harness().await;
        let session_id = orchestrator.start_session(None, "upload-cred").await;
        assert!(!session_id.is_empty());
        assert!(orchestrator.tick_capture(false));
    }

    #[tokio::test]
    async fn stop_session_returns_a_retention_decision() {
        let (orchestrator, _dir, _touch) = harness().await;
        orchestrator.start_session(Some("sess-fixed".to_string()), "cred").await;
        let decision = orchestrator.stop_session().await.unwrap();
        assert!(decision.promoted);
    }

    #[tokio::test]
    async fn taps_past_batch_size_are_shipped_without_losing_events() {
        let (orchestrator, _dir, touch_intake) = harness().await;
        orchestrator.start_session(Some("sess-taps".to_string()), "cred").await;

        use platform::{TouchPhase, TouchPoint};
        for i in 0..3u64 {
            touch_intake.fire(TouchEvent {
                phase: TouchPhase::Down,
                points: vec![TouchPoint { pointer_id: 1, x: 10.0, y: 10.0 }],
                timestamp_ms: i * 100,
                target_hint: None,
                is_dead_tap_hint: false,
            });
            touch_intake.fire(TouchEvent {
                phase: TouchPhase::Up,
                points: vec![TouchPoint { pointer_id: 1, x: 10.0, y: 10.0 }],
                timestamp_ms: i * 100 + 40,
                target_hint: None,
                is_dead_tap_hint: false,
            });
        }

        // Give the batch-drain task a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let decision = orchestrator.stop_session().await.unwrap();
        assert!(decision.promoted);
    }

    #[tokio::test]
    async fn background_then_foreground_round_trip_does_not_panic() {
        let (orchestrator, _dir, _touch) = harness().await;
        orchestrator.start_session(Some("sess-bg".to_string()), "cred").await;
        assert!(orchestrator.on_background().await);
        orchestrator.on_foreground().await;
        orchestrator.stop_session().await;
    }

    #[tokio::test]
    async fn health_snapshot_reports_components_starting_before_their_first_tick() {
        let (orchestrator, _dir, _touch) = harness().await;
        let status = orchestrator.health_snapshot();
        assert!(status.components.contains_key("fault-uploader"));
        assert!(status.components.contains_key("dispatch-worker-pool"));
    }

    #[tokio::test]
    async fn shutdown_stops_the_fault_upload_worker() {
        let (orchestrator, _dir, _touch) = harness().await;
        orchestrator.shutdown();
    }
}
