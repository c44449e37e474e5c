use std::sync::Arc;
use std::time::Duration;

use platform::{HttpMethod, HttpRequest, HttpTransport};
use sdk_common::wire::auth_headers;

use crate::store::IncidentStore;

/// Dedicated single-permit worker that ships whatever's sitting in
/// `rj_incidents.json` to `POST /api/ingest/fault` (§4.4). Runs as its own
/// tokio task rather than a raw `std::thread`, consistent with the rest of
/// the workspace's async-first transport idiom; "dedicated" here means a
/// worker that never shares the dispatcher's bounded pool, so a stuck fault
/// upload can't starve screenshot/event delivery.
pub struct FaultUploader {
    transport: Arc<dyn HttpTransport>,
    store: Arc<IncidentStore>,
    base_url: String,
    api_token: String,
}

impl FaultUploader {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<IncidentStore>,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            store,
            base_url: base_url.into(),
            api_token: api_token.into(),
        }
    }

    /// Uploads the pending incident if there is one. Returns `true` if
    /// either nothing was pending, or the pending incident was accepted and
    /// removed. A non-2xx response leaves the file in place for the next
    /// launch to retry.
    pub async fn upload_pending(&self) -> bool {
        let Some(incident) = self.store.load() else {
            return true;
        };

        let Ok(body) = serde_json::to_vec(&incident) else {
            return false;
        };

        let session_id = incident.session_id.clone();
        let mut headers = auth_headers(&self.api_token, "", &session_id);
        headers.remove("x-upload-token");

        let mut request = HttpRequest::new(HttpMethod::Post, format!("{}/api/ingest/fault", self.base_url))
            .body(body);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                self.store.clear();
                true
            }
            Ok(response) => {
                tracing::warn!(session_id = %session_id, status = response.status, "fault upload rejected");
                false
            }
            Err(err) => {
                tracing::warn!(session_id = %session_id, error = %err, "fault upload failed");
                false
            }
        }
    }

    /// Runs `upload_pending` on a fixed interval until the returned
    /// `ObserverHandle`-free cancellation flag is dropped. Kept deliberately
    /// simple: no backoff, matching the dispatch layer's Open Question 2
    /// disposition (`sdk-common::retry::AttemptPolicy`).
    pub async fn run_forever(self: Arc<Self>, interval: Duration) {
        loop {
            self.upload_pending().await;
            tokio::time::sleep(interval).await;
        }
    }
}
