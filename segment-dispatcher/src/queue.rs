use bytes::Bytes;
use sdk_common::wire::ContentType;

/// A unit of work owned exclusively by the dispatcher, whether fresh or
/// re-enqueued after a retryable failure (§3's pending-upload record).
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub session_id: String,
    pub content_type: ContentType,
    pub payload: Bytes,
    pub range_start: u64,
    pub range_end: u64,
    pub item_count: u64,
    pub batch_number: Option<u64>,
    pub is_sampled_in: bool,
    pub attempt: u32,
}

impl PendingUpload {
    pub fn new(
        session_id: impl Into<String>,
        content_type: ContentType,
        payload: Bytes,
        range_start: u64,
        range_end: u64,
        item_count: u64,
        batch_number: Option<u64>,
        is_sampled_in: bool,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            content_type,
            payload,
            range_start,
            range_end,
            item_count,
            batch_number,
            is_sampled_in,
            attempt: 0,
        }
    }
}
