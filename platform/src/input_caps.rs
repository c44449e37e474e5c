use crate::observer::ObserverHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Down,
    Move,
    Up,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub pointer_id: u64,
    pub x: f32,
    pub y: f32,
}

/// One raw touch-stream sample. `target_hint` and `is_dead_tap_hint` are
/// populated by the host bridge/JS layer (§4.6: native side only emits the
/// hint, it doesn't resolve interactable targets itself).
#[derive(Debug, Clone)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub points: Vec<TouchPoint>,
    pub timestamp_ms: u64,
    pub target_hint: Option<String>,
    pub is_dead_tap_hint: bool,
}

/// A non-consuming tap on the foreground window's touch dispatch. Must never
/// alter delivery order to the host's own handlers. Installation is
/// idempotent and re-installs on foreground-window change (§4.6).
pub trait TouchIntake: Send + Sync {
    fn install(&self, callback: Box<dyn Fn(TouchEvent) + Send + Sync>) -> ObserverHandle;
}

/// Observes the window's visible frame height to detect keyboard show/hide;
/// a height delta greater than 15% of window height toggles visibility
/// (§4.6).
pub trait WindowFrameObserver: Send + Sync {
    fn window_height(&self) -> f32;
    fn visible_frame_height(&self) -> f32;
    fn on_frame_change(&self, callback: Box<dyn Fn(f32) + Send + Sync>) -> ObserverHandle;
}

/// One change on a registered text field. Masking is applied upstream of
/// this trait: a masked field's `value` must already be redacted by the time
/// it reaches the recorder (§4.6).
#[derive(Debug, Clone)]
pub struct TextFieldSample {
    pub field_id: String,
    pub value: String,
    pub masked: bool,
    pub hint: String,
}

pub trait TextFieldWatcher: Send + Sync {
    fn register(
        &self,
        field_id: &str,
        masked: bool,
        hint: &str,
        callback: Box<dyn Fn(TextFieldSample) + Send + Sync>,
    ) -> ObserverHandle;
}
