use crate::observer::ObserverHandle;

/// Window-relative pixel bounds of the foreground surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowBounds {
    pub width: u32,
    pub height: u32,
}

/// Window-relative rectangle, used both for sensitive regions and for
/// individual view-tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A raw RGBA bitmap as read from the view tree (already down-scaled by the
/// `ScreenSurface` implementation to the requested `max_dimension`).
#[derive(Debug, Clone)]
pub struct CapturedBitmap {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixels, length `width * height * 4`.
    pub rgba: Vec<u8>,
}

/// One node in a shallow, depth-capped walk of the view tree. Used for both
/// map-surface presence detection and the `hierarchy` payload.
#[derive(Debug, Clone, Default)]
pub struct ViewNode {
    pub id: String,
    pub class_name: String,
    pub rect: Rect,
    pub is_gpu_surface: bool,
    pub is_map_surface: bool,
    pub tagged_sensitive: bool,
    pub category: Option<SensitiveCategory>,
    pub children: Vec<ViewNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveCategory {
    TextInput,
    CameraPreview,
    BrowserView,
    VideoLayer,
    TaggedSentinel,
}

/// The host app's foreground window, read-only from the SDK's point of view.
pub trait ScreenSurface: Send + Sync {
    fn bounds(&self) -> WindowBounds;

    /// Render the current view tree into an RGBA bitmap, down-scaled so its
    /// longest edge is at most `max_dimension`. Returns `None` if the
    /// surface cannot currently be captured (mid-layout, torn down, etc).
    fn render_bitmap(&self, scale: f32, max_dimension: u32) -> Option<CapturedBitmap>;
}

/// Walks the live view tree, bounded by a hard depth cap, to find sensitive
/// regions and GPU/map surfaces.
pub trait ViewHierarchyProvider: Send + Sync {
    fn snapshot(&self, depth_cap: usize) -> ViewNode;
}

/// Platform pixel-copy capability used to read back GPU-composited surfaces
/// (maps, camera, video) that otherwise render as opaque black.
pub trait PixelCopyProvider: Send + Sync {
    fn read_back(&self, node: &ViewNode) -> Option<CapturedBitmap>;
}

/// A narrow adapter over a map SDK's idle/move callbacks, so VisualCapture
/// can skip ticks while the camera is moving and force an out-of-band
/// snapshot the moment it goes idle.
pub trait MapIdleSource: Send + Sync {
    fn is_camera_idle(&self) -> bool;

    /// Registers a callback fired on the next idle transition. Dropping the
    /// returned handle unregisters it.
    fn on_next_idle(&self, callback: Box<dyn Fn() + Send + Sync>) -> ObserverHandle;
}
