use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use platform::CapturedBitmap;

/// One encoded frame plus the wall-clock time it was captured at, held in
/// the in-memory buffer until the bundle is flushed.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub captured_at_ms: u64,
    pub jpeg: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("jpeg encoding failed: {0}")]
    Jpeg(String),
}

/// Encodes a masked RGBA canvas to JPEG at the configured quality (§4.3,
/// default 0.5 meaning quality 50 on the encoder's 1-100 scale).
pub fn encode_jpeg(bitmap: &CapturedBitmap, quality: f32) -> Result<Bytes, EncodeError> {
    let quality_u8 = (quality.clamp(0.0, 1.0) * 100.0).round() as u8;
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality_u8.max(1));
    encoder
        .encode(&bitmap.rgba, bitmap.width, bitmap.height, ExtendedColorType::Rgba8)
        .map_err(|e| EncodeError::Jpeg(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Frames a batch of encoded frames as `[u64 BE relative_ts][u32 BE
/// len][jpeg bytes]...` and gzips the concatenation (§4.3). Timestamps are
/// relative to `session_epoch_ms` to keep the header small. Panics never:
/// an empty `frames` slice yields a valid, empty-payload gzip stream.
pub fn encode_frame_bundle(frames: &[EncodedFrame], session_epoch_ms: u64) -> std::io::Result<Bytes> {
    let mut raw = Vec::new();
    for frame in frames {
        let relative_ts = frame.captured_at_ms.saturating_sub(session_epoch_ms);
        raw.extend_from_slice(&relative_ts.to_be_bytes());
        raw.extend_from_slice(&(frame.jpeg.len() as u32).to_be_bytes());
        raw.extend_from_slice(&frame.jpeg);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(Bytes::from(encoder.finish()?))
}

/// `<sessionId>-<lastFrameTs>.tar.gz`, the filename convention handed to the
/// dispatcher (§4.3) — purely informational, since the dispatcher ships the
/// bundle as a request body rather than a filesystem object.
pub fn bundle_filename(session_id: &str, last_frame_ts_ms: u64) -> String {
    format!("{session_id}-{last_frame_ts_ms}.tar.gz")
}

/// Decodes a gzip+framed bundle back into its constituent frames. Used only
/// by tests to assert the round-trip and ordering invariant (§8); the
/// production path never decodes its own bundles.
#[cfg(test)]
pub fn decode_frame_bundle(bundle: &[u8]) -> Vec<(u64, Vec<u8>)> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut raw = Vec::new();
    GzDecoder::new(bundle).read_to_end(&mut raw).unwrap();

    let mut frames = Vec::new();
    let mut cursor = 0usize;
    while cursor + 12 <= raw.len() {
        let ts = u64::from_be_bytes(raw[cursor..cursor + 8].try_into().unwrap());
        let len = u32::from_be_bytes(raw[cursor + 8..cursor + 12].try_into().unwrap()) as usize;
        cursor += 12;
        let jpeg = raw[cursor..cursor + len].to_vec();
        cursor += len;
        frames.push((ts, jpeg));
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_bitmap() -> CapturedBitmap {
        CapturedBitmap {
            width: 4,
            height: 4,
            rgba: vec![128u8; 4 * 4 * 4],
        }
    }

    #[test]
    fn jpeg_encoding_round_trips_through_decode() {
        let bitmap = tiny_bitmap();
        let jpeg = encode_jpeg(&bitmap, 0.5).unwrap();
        assert!(!jpeg.is_empty());
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.height(), 4);
    }

    #[test]
    fn bundle_preserves_relative_timestamps_and_order() {
        let epoch = 1_000u64;
        let frames = vec![
            EncodedFrame { captured_at_ms: 1_000, jpeg: encode_jpeg(&tiny_bitmap(), 0.5).unwrap() },
            EncodedFrame { captured_at_ms: 1_500, jpeg: encode_jpeg(&tiny_bitmap(), 0.5).unwrap() },
            EncodedFrame { captured_at_ms: 2_200, jpeg: encode_jpeg(&tiny_bitmap(), 0.5).unwrap() },
        ];

        let bundle = encode_frame_bundle(&frames, epoch).unwrap();
        let decoded = decode_frame_bundle(&bundle);

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].0, 0);
        assert_eq!(decoded[1].0, 500);
        assert_eq!(decoded[2].0, 1_200);
        assert!(decoded.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn filename_follows_convention() {
        assert_eq!(bundle_filename("sess-1", 4200), "sess-1-4200.tar.gz");
    }
}
