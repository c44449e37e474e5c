//! C2: the networked segment upload pipeline (§4.2) — presign/PUT/confirm
//! with a circuit breaker, a bounded retry queue, and embedded SDK
//! self-telemetry. Plays the role the teacher's `hook-worker` crate plays
//! for webhook delivery, adapted from a Kafka-fed queue to an in-process
//! one and from exponential backoff to the spec's capped-retry policy.

mod circuit_breaker;
mod dispatcher;
mod queue;
mod rate_limit;

pub use circuit_breaker::CircuitBreaker;
pub use dispatcher::{DispatcherConfig, SegmentDispatcher};
pub use queue::PendingUpload;
pub use rate_limit::SessionRateLimiter;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use platform::{FakeClock, HttpRequest, HttpResponse, HttpTransport, TransportError};
    use sdk_common::wire::ContentType;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedTransport {
        responses: Mutex<std::collections::VecDeque<Result<HttpResponse, TransportError>>>,
        calls: AtomicU64,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU64::new(0),
            }
        }

        fn call_count(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Connection("script exhausted".into())))
        }
    }

    fn ok(body: serde_json::Value) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        })
    }

    fn status(code: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: code,
            body: Bytes::new(),
        })
    }

    fn upload() -> PendingUpload {
        PendingUpload::new(
            "sess-1",
            ContentType::Events,
            Bytes::from_static(b"gzipped-bytes"),
            0,
            1000,
            12,
            Some(7),
            true,
        )
    }

    async fn dispatcher_with(transport: ScriptedTransport) -> SegmentDispatcher {
        let clock = Arc::new(FakeClock::new(0));
        let dispatcher = SegmentDispatcher::new(Arc::new(transport), clock, DispatcherConfig::default());
        dispatcher.configure("sess-1", "token", "cred").await;
        dispatcher
    }

    #[tokio::test]
    async fn three_step_upload_succeeds() {
        let transport = ScriptedTransport::new(vec![
            ok(serde_json::json!({"presignedUrl": "https://s3/segment", "batchId": "batch-1"})),
            status(200),
            status(200),
        ]);
        let dispatcher = dispatcher_with(transport).await;

        assert!(dispatcher.submit(upload()).await);
        let snapshot = dispatcher.telemetry_snapshot("sess-1").await.unwrap();
        assert_eq!(snapshot.upload_success_count, 1);
    }

    #[tokio::test]
    async fn skip_upload_is_terminal_success() {
        let transport = ScriptedTransport::new(vec![ok(serde_json::json!({"skipUpload": true}))]);
        let dispatcher = dispatcher_with(transport).await;
        assert!(dispatcher.submit(upload()).await);
    }

    #[tokio::test]
    async fn billing_block_sticks_for_process_lifetime() {
        let transport = Arc::new(ScriptedTransport::new(vec![status(402)]));
        let dispatcher = SegmentDispatcher::new(
            transport.clone(),
            Arc::new(FakeClock::new(0)),
            DispatcherConfig::default(),
        );
        dispatcher.configure("sess-1", "token", "cred").await;

        assert!(!dispatcher.submit(upload()).await);
        assert!(dispatcher.billing_blocked());

        // A second submission must not even touch the network once blocked.
        assert!(!dispatcher.submit(upload()).await);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_upload_is_requeued_up_to_max_attempts() {
        let transport = ScriptedTransport::new(vec![
            status(500),
            status(500),
            status(500),
            status(500),
            status(500),
        ]);
        let dispatcher = dispatcher_with(transport).await;

        assert!(!dispatcher.submit(upload()).await);
        assert_eq!(dispatcher.queue_depth().await, 1);

        dispatcher.ship_pending().await;
        assert_eq!(dispatcher.queue_depth().await, 1);

        dispatcher.ship_pending().await;
        // Third attempt (attempt index 2) exhausts AttemptPolicy::default() (max 3), dropped.
        assert_eq!(dispatcher.queue_depth().await, 0);
    }

    #[tokio::test]
    async fn breaker_trips_after_five_consecutive_failures() {
        // Five fresh submissions, each failing at the presign step: the
        // breaker sees five consecutive failures and opens exactly once.
        let transport = ScriptedTransport::new((0..5).map(|_| status(500)).collect());
        let dispatcher = dispatcher_with(transport).await;

        for _ in 0..5 {
            assert!(!dispatcher.submit(upload()).await);
        }

        let snapshot = dispatcher.telemetry_snapshot("sess-1").await.unwrap();
        assert_eq!(snapshot.circuit_breaker_open_count, 1);
        assert_eq!(snapshot.upload_failure_count, 5);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_without_touching_network() {
        let transport = Arc::new(ScriptedTransport::new((0..5).map(|_| status(500)).collect()));
        let dispatcher = SegmentDispatcher::new(
            transport.clone(),
            Arc::new(FakeClock::new(0)),
            DispatcherConfig::default(),
        );
        dispatcher.configure("sess-1", "token", "cred").await;

        for _ in 0..5 {
            dispatcher.submit(upload()).await;
        }
        assert_eq!(transport.call_count(), 5);

        assert!(!dispatcher.submit(upload()).await);
        assert_eq!(transport.call_count(), 5, "breaker-open submission must not reach the transport");
    }
}
