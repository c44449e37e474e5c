use std::collections::VecDeque;
use std::sync::Mutex;

use sdk_common::SdkTelemetry;

use crate::bundle::EncodedFrame;

/// Bounded in-memory FIFO of encoded frames (§4.3/§5 backpressure).
/// `maxBufferedScreenshots=500` by default; past that, the oldest frame is
/// dropped and `memoryEvictionCount`/`bytesEvicted` telemetry increments.
pub struct FrameBuffer {
    max_frames: usize,
    frames: Mutex<VecDeque<EncodedFrame>>,
}

impl FrameBuffer {
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            frames: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, frame: EncodedFrame, telemetry: &SdkTelemetry) {
        let mut frames = self.frames.lock().unwrap();
        if frames.len() >= self.max_frames {
            if let Some(evicted) = frames.pop_front() {
                telemetry.record_memory_eviction(evicted.jpeg.len() as u64);
            }
        }
        frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically takes everything currently buffered, leaving the buffer
    /// empty, for handoff to the bundle encoder.
    pub fn drain_all(&self) -> Vec<EncodedFrame> {
        self.frames.lock().unwrap().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(ts: u64) -> EncodedFrame {
        EncodedFrame { captured_at_ms: ts, jpeg: Bytes::from_static(b"jpeg") }
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let buffer = FrameBuffer::new(2);
        let telemetry = SdkTelemetry::new();

        buffer.push(frame(1), &telemetry);
        buffer.push(frame(2), &telemetry);
        buffer.push(frame(3), &telemetry);

        let frames = buffer.drain_all();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].captured_at_ms, 2);
        assert_eq!(frames[1].captured_at_ms, 3);
        assert_eq!(telemetry.snapshot(0).memory_eviction_count, 1);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let buffer = FrameBuffer::new(10);
        let telemetry = SdkTelemetry::new();
        buffer.push(frame(1), &telemetry);
        assert_eq!(buffer.drain_all().len(), 1);
        assert!(buffer.is_empty());
    }
}
