//! C3: periodic visual snapshot, redaction, and batching into gzipped
//! frame bundles (§4.3). Has no direct teacher analog in PostHog (the
//! teacher never captures pixels); built from the capability traits in
//! `platform` in the teacher's adapter-pattern idiom, enriched with the
//! `image`/`flate2` stack sourced from the pack's other example repos.

mod bundle;
mod capture;
mod frame_buffer;
mod hierarchy;
mod mask;
mod quality;

pub use bundle::{bundle_filename, encode_frame_bundle, encode_jpeg, EncodeError, EncodedFrame};
pub use capture::{recover_pending_frames, CaptureConfig, VisualCapture};
pub use frame_buffer::FrameBuffer;
pub use hierarchy::{HierarchyBatch, HierarchyNode};
pub use mask::{apply_mask, RedactionRegistry};
pub use quality::{compute_level, DeviceSignals, PerformanceLevel, ThermalStatus};
