use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use platform::{Clock, MapIdleSource, PixelCopyProvider, Rect, ScreenSurface, ViewHierarchyProvider, ViewNode, WindowBounds};
use sdk_common::wire::ContentType;
use sdk_common::SdkTelemetry;
use segment_dispatcher::{PendingUpload, SegmentDispatcher};

use crate::bundle::{encode_frame_bundle, encode_jpeg, EncodedFrame};
use crate::frame_buffer::FrameBuffer;
use crate::hierarchy::HierarchyBatch;
use crate::mask::{apply_mask, RedactionRegistry};
use crate::quality::{compute_level, DeviceSignals, PerformanceLevel};

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub snapshot_interval_ms: u64,
    pub scale: f32,
    pub max_dimension: u32,
    pub jpeg_quality: f32,
    pub batch_size: usize,
    pub max_buffered_screenshots: usize,
    pub hierarchy_every_n_ticks: u32,
    pub view_tree_depth_cap: usize,
    pub mask_refresh_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: 1_000,
            scale: 0.8, // 1 / 1.25
            max_dimension: 1280,
            jpeg_quality: 0.5,
            batch_size: 20,
            max_buffered_screenshots: 500,
            hierarchy_every_n_ticks: 5,
            view_tree_depth_cap: 40,
            mask_refresh_interval_ms: 500,
        }
    }
}

/// C3: periodic screen snapshot, privacy masking, GPU-surface compositing,
/// and bundle encoding (§4.3). `tick()` is synchronous and meant to run on
/// the UI-thread message loop; the network handoff in
/// `flush_buffer_to_network` is async and must be awaited off that thread.
pub struct VisualCapture {
    screen: Arc<dyn ScreenSurface>,
    hierarchy_provider: Arc<dyn ViewHierarchyProvider>,
    pixel_copy: Arc<dyn PixelCopyProvider>,
    map_idle: Arc<dyn MapIdleSource>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<SegmentDispatcher>,
    config: CaptureConfig,

    session_id: Mutex<Option<String>>,
    session_epoch_ms: AtomicU64,
    active: AtomicBool,

    redaction: RedactionRegistry,
    mask_last_refresh_ms: AtomicU64,
    frame_buffer: FrameBuffer,
    hierarchy_batch: HierarchyBatch,
    tick_count: AtomicU32,
    telemetry: RwLock<Option<Arc<SdkTelemetry>>>,
    performance_level: Mutex<PerformanceLevel>,
    idle_handle: Mutex<Option<platform::ObserverHandle>>,
}

impl VisualCapture {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        screen: Arc<dyn ScreenSurface>,
        hierarchy_provider: Arc<dyn ViewHierarchyProvider>,
        pixel_copy: Arc<dyn PixelCopyProvider>,
        map_idle: Arc<dyn MapIdleSource>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<SegmentDispatcher>,
        config: CaptureConfig,
    ) -> Self {
        let frame_buffer = FrameBuffer::new(config.max_buffered_screenshots);
        Self {
            screen,
            hierarchy_provider,
            pixel_copy,
            map_idle,
            clock,
            dispatcher,
            config,
            session_id: Mutex::new(None),
            session_epoch_ms: AtomicU64::new(0),
            active: AtomicBool::new(false),
            redaction: RedactionRegistry::new(),
            mask_last_refresh_ms: AtomicU64::new(0),
            frame_buffer,
            hierarchy_batch: HierarchyBatch::new(),
            tick_count: AtomicU32::new(0),
            telemetry: RwLock::new(None),
            performance_level: Mutex::new(PerformanceLevel::Normal),
            idle_handle: Mutex::new(None),
        }
    }

    /// `beginCapture(sessionEpoch)` (§9's lifecycle). Must be preceded by a
    /// `SegmentDispatcher::configure` for the same session. Also registers a
    /// map-idle callback (§4.3) so an idle transition while the camera was
    /// moving triggers an immediate out-of-band snapshot, rather than
    /// waiting for the next polled tick.
    pub async fn begin_capture(self: &Arc<Self>, session_id: &str, session_epoch_ms: u64) {
        *self.session_id.lock().unwrap() = Some(session_id.to_string());
        self.session_epoch_ms.store(session_epoch_ms, Ordering::Release);
        self.tick_count.store(0, Ordering::Release);
        *self.telemetry.write().unwrap() = self.dispatcher.telemetry_handle(session_id).await;
        self.active.store(true, Ordering::Release);

        let weak = Arc::downgrade(self);
        let idle_handle = self.map_idle.on_next_idle(Box::new(move || {
            if let Some(this) = weak.upgrade() {
                this.tick(true);
            }
        }));
        *self.idle_handle.lock().unwrap() = Some(idle_handle);
    }

    pub fn set_performance_level(&self, signals: DeviceSignals) -> PerformanceLevel {
        let level = compute_level(signals);
        *self.performance_level.lock().unwrap() = level;
        level
    }

    pub fn register_sensitive_view(&self, view_id: impl Into<String>) {
        self.redaction.register_view(view_id);
    }

    /// One UI-thread timer tick. Never blocks on the network. Returns
    /// whether a frame was actually captured, for test assertions and
    /// metrics — callers otherwise ignore the return value.
    pub fn tick(&self, force: bool) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let level = *self.performance_level.lock().unwrap();
        if !level.should_capture() {
            return false;
        }

        let now_ms = self.clock.now_ms();
        let tree = self.hierarchy_provider.snapshot(self.config.view_tree_depth_cap);

        let map_present = tree_has_map_surface(&tree);
        if map_present && !self.map_idle.is_camera_idle() && !force {
            return false;
        }

        let bounds = self.screen.bounds();
        let effective_scale = self.config.scale * level.scale_multiplier();
        let Some(mut bitmap) = self.screen.render_bitmap(effective_scale, self.config.max_dimension) else {
            return false;
        };

        composite_gpu_surfaces(&tree, &*self.pixel_copy, &mut bitmap, bounds);

        let regions = self.refresh_mask_if_due(now_ms, &tree);
        apply_mask(&mut bitmap, bounds, &regions);

        let Ok(jpeg) = encode_jpeg(&bitmap, self.config.jpeg_quality) else {
            return false;
        };

        if let Some(telemetry) = self.telemetry.read().unwrap().clone() {
            self.frame_buffer.push(EncodedFrame { captured_at_ms: now_ms, jpeg }, &telemetry);
        }

        let ticks = self.tick_count.fetch_add(1, Ordering::AcqRel) + 1;
        if self.config.hierarchy_every_n_ticks > 0 && ticks % self.config.hierarchy_every_n_ticks == 0 {
            self.hierarchy_batch.push(now_ms, &tree);
        }

        true
    }

    fn refresh_mask_if_due(&self, now_ms: u64, tree: &ViewNode) -> Vec<Rect> {
        let last = self.mask_last_refresh_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) >= self.config.mask_refresh_interval_ms || last == 0 {
            self.mask_last_refresh_ms.store(now_ms, Ordering::Release);
            self.redaction.refresh(tree)
        } else {
            self.redaction.cached_regions()
        }
    }

    pub fn should_flush(&self) -> bool {
        self.frame_buffer.len() >= self.config.batch_size
    }

    /// `flushBufferToNetwork()` (§9). Packages whatever is currently
    /// buffered into a gzipped frame bundle and a gzipped hierarchy batch,
    /// and submits both to the dispatcher.
    pub async fn flush_buffer_to_network(&self) -> bool {
        let Some(session_id) = self.session_id.lock().unwrap().clone() else {
            return false;
        };
        let epoch = self.session_epoch_ms.load(Ordering::Acquire);

        let frames = self.frame_buffer.drain_all();
        let mut ok = true;
        if !frames.is_empty() {
            let range_start = frames.first().map(|f| f.captured_at_ms).unwrap_or(epoch);
            let range_end = frames.last().map(|f| f.captured_at_ms).unwrap_or(epoch);
            let item_count = frames.len() as u64;

            match encode_frame_bundle(&frames, epoch) {
                Ok(bundle) => {
                    let upload = PendingUpload::new(
                        session_id.clone(),
                        ContentType::Screenshots,
                        bundle,
                        range_start,
                        range_end,
                        item_count,
                        Some(self.dispatcher.next_batch_number()),
                        true,
                    );
                    ok &= self.dispatcher.submit(upload).await;
                }
                Err(err) => {
                    tracing::error!(session_id = %session_id, error = %err, "failed to encode frame bundle");
                    ok = false;
                }
            }
        }

        if !self.hierarchy_batch.is_empty() {
            let item_count = self.hierarchy_batch.len() as u64;
            match self.hierarchy_batch.flush() {
                Ok(payload) => {
                    let upload = PendingUpload::new(
                        session_id.clone(),
                        ContentType::Hierarchy,
                        payload,
                        epoch,
                        self.clock.now_ms(),
                        item_count,
                        Some(self.dispatcher.next_batch_number()),
                        true,
                    );
                    ok &= self.dispatcher.submit(upload).await;
                }
                Err(err) => {
                    tracing::error!(session_id = %session_id, error = %err, "failed to encode hierarchy batch");
                    ok = false;
                }
            }
        }

        ok
    }

    /// Persists whatever remains buffered to `<cache>/rj_pending/<sessionId>/frames/<tsMs>.jpeg`
    /// before going inactive (§4.3's crash safety).
    pub fn halt(&self, cache_root: &std::path::Path) {
        self.active.store(false, Ordering::Release);
        *self.idle_handle.lock().unwrap() = None;
        let Some(session_id) = self.session_id.lock().unwrap().clone() else {
            return;
        };
        let frames = self.frame_buffer.drain_all();
        if frames.is_empty() {
            return;
        }
        let dir = cache_root.join("rj_pending").join(&session_id).join("frames");
        if let Err(err) = std::fs::create_dir_all(&dir) {
            tracing::error!(session_id = %session_id, error = %err, "failed to create frames directory");
            return;
        }
        for frame in frames {
            let path = dir.join(format!("{}.jpeg", frame.captured_at_ms));
            if let Err(err) = std::fs::write(&path, &frame.jpeg) {
                tracing::error!(session_id = %session_id, error = %err, "failed to persist frame to disk");
            }
        }
    }
}

/// Reads every `<tsMs>.jpeg` file under a crashed session's frames
/// directory, in timestamp order, and packages them identically to an
/// in-memory bundle. The caller deletes the files only after a successful
/// upload (§4.3).
pub fn recover_pending_frames(frames_dir: &std::path::Path) -> std::io::Result<Vec<(std::path::PathBuf, EncodedFrame)>> {
    if !frames_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut recovered = Vec::new();
    for entry in std::fs::read_dir(frames_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jpeg") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(ts) = stem.parse::<u64>() else {
            continue;
        };
        let bytes = std::fs::read(&path)?;
        recovered.push((path, EncodedFrame { captured_at_ms: ts, jpeg: Bytes::from(bytes) }));
    }
    recovered.sort_by_key(|(_, frame)| frame.captured_at_ms);
    Ok(recovered)
}

fn tree_has_map_surface(node: &ViewNode) -> bool {
    node.is_map_surface || node.children.iter().any(tree_has_map_surface)
}

fn composite_gpu_surfaces(
    node: &ViewNode,
    pixel_copy: &dyn PixelCopyProvider,
    canvas: &mut platform::CapturedBitmap,
    bounds: WindowBounds,
) {
    if node.is_gpu_surface {
        if let Some(readback) = pixel_copy.read_back(node) {
            paint_region(canvas, bounds, node.rect, &readback);
        }
        // Readback failure: the host's opaque-black fallback is accepted (§4.3).
    }
    for child in &node.children {
        composite_gpu_surfaces(child, pixel_copy, canvas, bounds);
    }
}

fn paint_region(canvas: &mut platform::CapturedBitmap, bounds: WindowBounds, rect: Rect, source: &platform::CapturedBitmap) {
    if bounds.width == 0 || bounds.height == 0 || source.width == 0 || source.height == 0 {
        return;
    }
    let scale_x = canvas.width as f32 / bounds.width as f32;
    let scale_y = canvas.height as f32 / bounds.height as f32;
    let x0 = (rect.x * scale_x).floor().max(0.0) as u32;
    let y0 = (rect.y * scale_y).floor().max(0.0) as u32;
    let target_w = ((rect.width * scale_x).round() as u32).min(canvas.width.saturating_sub(x0));
    let target_h = ((rect.height * scale_y).round() as u32).min(canvas.height.saturating_sub(y0));

    for y in 0..target_h {
        for x in 0..target_w {
            // Nearest-neighbor sample from the source readback.
            let src_x = (x * source.width / target_w.max(1)).min(source.width - 1);
            let src_y = (y * source.height / target_h.max(1)).min(source.height - 1);
            let src_idx = ((src_y * source.width + src_x) * 4) as usize;
            let dst_idx = (((y0 + y) * canvas.width + (x0 + x)) * 4) as usize;
            if src_idx + 4 <= source.rgba.len() && dst_idx + 4 <= canvas.rgba.len() {
                canvas.rgba[dst_idx..dst_idx + 4].copy_from_slice(&source.rgba[src_idx..src_idx + 4]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::CapturedBitmap;

    #[test]
    fn recover_pending_frames_orders_by_embedded_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2000.jpeg"), b"frame-b").unwrap();
        std::fs::write(dir.path().join("1000.jpeg"), b"frame-a").unwrap();
        std::fs::write(dir.path().join("not-a-frame.txt"), b"ignore me").unwrap();

        let recovered = recover_pending_frames(dir.path()).unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].1.captured_at_ms, 1000);
        assert_eq!(recovered[1].1.captured_at_ms, 2000);
    }

    #[test]
    fn recover_pending_frames_on_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("frames");
        let recovered = recover_pending_frames(&missing).unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn gpu_surface_composites_readback_into_canvas() {
        let mut canvas = CapturedBitmap { width: 4, height: 4, rgba: vec![0u8; 64] };
        let bounds = WindowBounds { width: 4, height: 4 };
        let tree = ViewNode {
            id: "map".into(),
            rect: Rect { x: 0.0, y: 0.0, width: 4.0, height: 4.0 },
            is_gpu_surface: true,
            ..Default::default()
        };

        struct Readback;
        impl PixelCopyProvider for Readback {
            fn read_back(&self, _node: &ViewNode) -> Option<CapturedBitmap> {
                Some(CapturedBitmap { width: 2, height: 2, rgba: vec![77u8; 16] })
            }
        }

        composite_gpu_surfaces(&tree, &Readback, &mut canvas, bounds);
        assert_eq!(canvas.rgba[0], 77);
    }

    #[test]
    fn failed_readback_leaves_canvas_untouched() {
        let mut canvas = CapturedBitmap { width: 4, height: 4, rgba: vec![9u8; 64] };
        let bounds = WindowBounds { width: 4, height: 4 };
        let tree = ViewNode {
            id: "map".into(),
            rect: Rect { x: 0.0, y: 0.0, width: 4.0, height: 4.0 },
            is_gpu_surface: true,
            ..Default::default()
        };

        struct NoReadback;
        impl PixelCopyProvider for NoReadback {
            fn read_back(&self, _node: &ViewNode) -> Option<CapturedBitmap> {
                None
            }
        }

        composite_gpu_surfaces(&tree, &NoReadback, &mut canvas, bounds);
        assert_eq!(canvas.rgba[0], 9);
    }
}
