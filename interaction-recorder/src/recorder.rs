use std::sync::{Arc, Mutex};

use platform::{Clock, TextFieldWatcher, TouchEvent, TouchIntake, WindowFrameObserver};
use sdk_common::{Event, EventKind, Tallies};
use serde_json::json;

use crate::gesture::{Gesture, GestureClassifier, SwipeDirection};
use crate::keyboard::KeyboardTracker;
use crate::navigation::NavigationStack;

fn swipe_direction_str(direction: SwipeDirection) -> &'static str {
    match direction {
        SwipeDirection::Up => "up",
        SwipeDirection::Down => "down",
        SwipeDirection::Left => "left",
        SwipeDirection::Right => "right",
    }
}

/// C6 — installs a non-consuming touch tap, classifies the raw stream into
/// the gesture vocabulary, tracks keyboard visibility and navigation, and
/// routes everything to an `on_event` callback the orchestrator supplies
/// (§4.6). This crate has no dependency on `replay-orchestrator`, so output
/// travels out the same callback shape `anr-sentinel` uses for reports.
pub struct InteractionRecorder {
    touch_intake: Arc<dyn TouchIntake>,
    window_frame: Option<Arc<dyn WindowFrameObserver>>,
    text_fields: Option<Arc<dyn TextFieldWatcher>>,
    classifier: Mutex<GestureClassifier>,
    keyboard: Mutex<Option<KeyboardTracker>>,
    navigation: NavigationStack,
    tallies: Arc<Tallies>,
    clock: Arc<dyn Clock>,
    on_event: Arc<dyn Fn(Event) + Send + Sync>,
    on_navigation: Arc<dyn Fn() + Send + Sync>,
    session_id: Mutex<Option<String>>,
    touch_handle: Mutex<Option<platform::ObserverHandle>>,
    frame_handle: Mutex<Option<platform::ObserverHandle>>,
}

impl InteractionRecorder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        touch_intake: Arc<dyn TouchIntake>,
        window_frame: Option<Arc<dyn WindowFrameObserver>>,
        text_fields: Option<Arc<dyn TextFieldWatcher>>,
        tallies: Arc<Tallies>,
        clock: Arc<dyn Clock>,
        on_event: Arc<dyn Fn(Event) + Send + Sync>,
        on_navigation: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            touch_intake,
            window_frame,
            text_fields,
            classifier: Mutex::new(GestureClassifier::new()),
            keyboard: Mutex::new(None),
            navigation: NavigationStack::new(),
            tallies,
            clock,
            on_event,
            on_navigation,
            session_id: Mutex::new(None),
            touch_handle: Mutex::new(None),
            frame_handle: Mutex::new(None),
        }
    }

    /// Idempotent: reinstalling on a foreground-window change replaces the
    /// previous handle, which unregisters on drop (§4.6).
    pub fn activate(self: &Arc<Self>, session_id: impl Into<String>) {
        *self.session_id.lock().unwrap() = Some(session_id.into());

        let weak = Arc::downgrade(self);
        let touch_handle = self.touch_intake.install(Box::new(move |event: TouchEvent| {
            if let Some(this) = weak.upgrade() {
                this.handle_touch(&event);
            }
        }));
        *self.touch_handle.lock().unwrap() = Some(touch_handle);

        if let Some(window_frame) = &self.window_frame {
            *self.keyboard.lock().unwrap() = Some(KeyboardTracker::new(window_frame.window_height()));
            let weak = Arc::downgrade(self);
            let frame_handle = window_frame.on_frame_change(Box::new(move |height| {
                if let Some(this) = weak.upgrade() {
                    this.handle_frame_height(height);
                }
            }));
            *self.frame_handle.lock().unwrap() = Some(frame_handle);
        }
    }

    pub fn deactivate(&self) {
        *self.touch_handle.lock().unwrap() = None;
        *self.frame_handle.lock().unwrap() = None;
    }

    pub fn register_text_field(&self, field_id: &str, masked: bool, hint: &str) -> Option<platform::ObserverHandle> {
        let text_fields = self.text_fields.as_ref()?;
        let on_event = Arc::clone(&self.on_event);
        let clock = Arc::clone(&self.clock);
        let session_id = self.session_id.lock().unwrap().clone();
        let field_id_owned = field_id.to_string();

        Some(text_fields.register(
            field_id,
            masked,
            hint,
            Box::new(move |sample| {
                let payload = json!({
                    "field": field_id_owned,
                    "value": sample.value,
                    "masked": sample.masked,
                    "hint": sample.hint,
                });
                on_event(Event::new(
                    EventKind::Input,
                    clock.now_ms(),
                    session_id.clone().unwrap_or_default(),
                    payload,
                ));
            }),
        ))
    }

    pub fn push_screen(&self, id: impl Into<String>) {
        let transition = self.navigation.push_screen(id);
        self.emit_view_transition(transition);
        (self.on_navigation)();
    }

    pub fn pop_screen(&self) {
        if let Some(transition) = self.navigation.pop_screen() {
            self.emit_view_transition(transition);
            (self.on_navigation)();
        }
    }

    fn emit_view_transition(&self, transition: crate::navigation::ViewTransition) {
        let payload = json!({
            "from": transition.from,
            "to": transition.to,
            "entering": transition.entering,
        });
        self.emit(EventKind::ViewTransition, payload);
    }

    fn handle_touch(&self, event: &TouchEvent) {
        let gestures = self.classifier.lock().unwrap().on_touch(event);
        for gesture in gestures {
            self.handle_gesture(gesture);
        }
    }

    fn handle_gesture(&self, gesture: Gesture) {
        self.tallies.record_gesture();

        match gesture {
            Gesture::Tap { x, y, target } => {
                self.tallies.record_tap();
                self.emit(EventKind::Tap, json!({"x": x, "y": y, "target": target}));
            }
            Gesture::LongPress { x, y, target, duration_ms } => {
                self.emit(
                    EventKind::LongPress,
                    json!({"x": x, "y": y, "target": target, "durationMs": duration_ms}),
                );
            }
            Gesture::RageTap { x, y, target, count } => {
                self.tallies.record_rage_tap();
                self.emit(
                    EventKind::RageTap,
                    json!({"x": x, "y": y, "target": target, "count": count}),
                );
            }
            Gesture::DeadTap { x, y, target } => {
                self.tallies.record_dead_tap();
                self.emit(EventKind::DeadTap, json!({"x": x, "y": y, "target": target}));
            }
            Gesture::Pan { x, y, dx, dy } => {
                self.emit(EventKind::Pan, json!({"x": x, "y": y, "dx": dx, "dy": dy}));
            }
            Gesture::Scroll { dx, dy } => {
                self.emit(EventKind::Scroll, json!({"dx": dx, "dy": dy}));
            }
            Gesture::Swipe { direction, x, y, velocity_px_ms } => {
                self.emit(
                    EventKind::Swipe,
                    json!({"direction": swipe_direction_str(direction), "x": x, "y": y, "velocityPxMs": velocity_px_ms}),
                );
            }
            Gesture::Pinch { scale, terminal } => {
                self.emit(EventKind::Pinch, json!({"scale": scale, "terminal": terminal}));
            }
            Gesture::Rotation { angle_rad } => {
                self.emit(EventKind::Rotation, json!({"angleRad": angle_rad}));
            }
        }
    }

    fn handle_frame_height(&self, visible_frame_height: f32) {
        let keyboard_event = {
            let guard = self.keyboard.lock().unwrap();
            guard.as_ref().and_then(|tracker| tracker.on_visible_frame_height(visible_frame_height))
        };

        if let Some(event) = keyboard_event {
            self.emit(EventKind::Input, json!({"keyboardVisible": event.visible}));
        }
    }

    fn emit(&self, kind: EventKind, payload: serde_json::Value) {
        let session_id = self.session_id.lock().unwrap().clone().unwrap_or_default();
        (self.on_event)(Event::new(kind, self.clock.now_ms(), session_id, payload));
    }
}
