use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::telemetry::SdkTelemetrySnapshot;

/// The three kinds of payload the dispatcher ships (§4.2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Screenshots,
    Hierarchy,
    Events,
}

impl ContentType {
    /// `/api/ingest/segment/presign` is shared by screenshots and hierarchy;
    /// events use the dedicated `/api/ingest/presign` (§4.2, §6).
    pub fn presign_path(self) -> &'static str {
        match self {
            ContentType::Events => "/api/ingest/presign",
            ContentType::Screenshots | ContentType::Hierarchy => "/api/ingest/segment/presign",
        }
    }

    pub fn complete_path(self) -> &'static str {
        match self {
            ContentType::Events => "/api/ingest/batch/complete",
            ContentType::Screenshots | ContentType::Hierarchy => "/api/ingest/segment/complete",
        }
    }

    /// The confirm body's count field is named differently per endpoint
    /// (§6): `frameCount` on `segment/complete`, `eventCount` on
    /// `batch/complete`.
    pub fn complete_count(self, count: u64) -> CompleteCount {
        match self {
            ContentType::Events => CompleteCount::Event { event_count: count },
            ContentType::Screenshots | ContentType::Hierarchy => CompleteCount::Frame { frame_count: count },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum CompleteCount {
    Frame { frame_count: u64 },
    Event { event_count: u64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    pub session_id: String,
    pub size_bytes: u64,
    pub content_type: ContentType,
    pub start_time: u64,
    pub end_time: u64,
    pub item_count: u64,
    pub compression: &'static str,
    pub is_sampled_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    #[serde(default)]
    pub presigned_url: Option<String>,
    #[serde(alias = "segmentId")]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub skip_upload: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub segment_id: String,
    pub actual_size_bytes: u64,
    pub timestamp: u64,
    #[serde(flatten)]
    pub count: CompleteCount,
    pub sdk_telemetry: SdkTelemetrySnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteResponse {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndRequest {
    pub session_id: String,
    pub ended_at: u64,
    pub background_duration_ms: u64,
    pub metrics: crate::tallies::TalliesSnapshot,
    pub queue_depth: u64,
    pub sdk_telemetry: SdkTelemetrySnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionEvaluateRequest {
    pub session_id: String,
    pub metrics: crate::tallies::TalliesSnapshot,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionEvaluateResponse {
    pub promoted: bool,
    pub reason: String,
}

/// Single-object POST body for `/api/ingest/fault` — identical shape to the
/// on-disk `Incident` (§6).
pub type FaultRequest = crate::incident::Incident;

/// `x-rejourney-key` / `x-upload-token` / `x-session-id` are present on every
/// authenticated call (§4.2, §6).
pub fn auth_headers(api_token: &str, upload_credential: &str, session_id: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("x-rejourney-key".to_string(), api_token.to_string());
    headers.insert("x-upload-token".to_string(), upload_credential.to_string());
    headers.insert("x-session-id".to_string(), session_id.to_string());
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_request(content_type: ContentType) -> CompleteRequest {
        CompleteRequest {
            segment_id: "seg-1".to_string(),
            actual_size_bytes: 1024,
            timestamp: 1_000,
            count: content_type.complete_count(7),
            sdk_telemetry: SdkTelemetrySnapshot::default(),
        }
    }

    #[test]
    fn segment_complete_serializes_frame_count() {
        let json = serde_json::to_value(complete_request(ContentType::Screenshots)).unwrap();
        assert_eq!(json["frameCount"], 7);
        assert!(json.get("itemCount").is_none());
        assert!(json.get("eventCount").is_none());
    }

    #[test]
    fn hierarchy_complete_also_uses_frame_count() {
        let json = serde_json::to_value(complete_request(ContentType::Hierarchy)).unwrap();
        assert_eq!(json["frameCount"], 7);
    }

    #[test]
    fn batch_complete_serializes_event_count() {
        let json = serde_json::to_value(complete_request(ContentType::Events)).unwrap();
        assert_eq!(json["eventCount"], 7);
        assert!(json.get("frameCount").is_none());
    }
}
