use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use sdk_common::Event;

/// Serializes a batch of events as a JSON array and gzips it, the same
/// framing `visual_capture::HierarchyBatch::flush` uses for its own batched
/// payload (§4.7's "batch-submit to SegmentDispatcher" step).
pub fn encode_event_batch(events: &[Event]) -> std::io::Result<Bytes> {
    let json = serde_json::to_vec(events).unwrap_or_default();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(Bytes::from(encoder.finish()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk_common::EventKind;
    use serde_json::json;

    #[test]
    fn empty_batch_still_gzips_cleanly() {
        let bytes = encode_event_batch(&[]).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn nonempty_batch_gzips_to_something_smaller_or_equal() {
        let events: Vec<Event> = (0..50)
            .map(|i| Event::new(EventKind::Tap, i, "sess-1", json!({"x": i})))
            .collect();
        let raw_len = serde_json::to_vec(&events).unwrap().len();
        let gz = encode_event_batch(&events).unwrap();
        assert!(!gz.is_empty());
        assert!(gz.len() <= raw_len + 64);
    }
}
