use std::sync::atomic::{AtomicBool, Ordering};

/// A height delta greater than 15% of window height toggles a visible/hidden
/// keyboard state and emits a keyboard event (§4.6).
const KEYBOARD_HEIGHT_DELTA_RATIO: f32 = 0.15;

pub struct KeyboardTracker {
    window_height: f32,
    visible: AtomicBool,
    key_press_counts: std::sync::Mutex<std::collections::HashMap<String, u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardEvent {
    pub visible: bool,
}

impl KeyboardTracker {
    pub fn new(window_height: f32) -> Self {
        Self {
            window_height,
            visible: AtomicBool::new(false),
            key_press_counts: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Feeds the window's current visible frame height. Returns `Some` the
    /// moment a visibility transition crosses the 15%-of-window-height
    /// threshold.
    pub fn on_visible_frame_height(&self, visible_frame_height: f32) -> Option<KeyboardEvent> {
        if self.window_height <= 0.0 {
            return None;
        }

        let delta_ratio = (self.window_height - visible_frame_height) / self.window_height;
        let should_be_visible = delta_ratio > KEYBOARD_HEIGHT_DELTA_RATIO;

        let was_visible = self.visible.swap(should_be_visible, Ordering::SeqCst);
        if was_visible != should_be_visible {
            Some(KeyboardEvent {
                visible: should_be_visible,
            })
        } else {
            None
        }
    }

    pub fn record_key_press(&self, field_id: &str) -> u32 {
        let mut counts = self.key_press_counts.lock().unwrap();
        let entry = counts.entry(field_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_height_delta_toggles_visible() {
        let tracker = KeyboardTracker::new(1000.0);
        assert_eq!(tracker.on_visible_frame_height(1000.0), None);
        assert_eq!(
            tracker.on_visible_frame_height(700.0),
            Some(KeyboardEvent { visible: true })
        );
    }

    #[test]
    fn small_height_delta_does_not_toggle() {
        let tracker = KeyboardTracker::new(1000.0);
        assert_eq!(tracker.on_visible_frame_height(900.0), None);
    }

    #[test]
    fn returning_to_full_height_toggles_back_to_hidden() {
        let tracker = KeyboardTracker::new(1000.0);
        tracker.on_visible_frame_height(600.0);
        assert_eq!(
            tracker.on_visible_frame_height(1000.0),
            Some(KeyboardEvent { visible: false })
        );
    }

    #[test]
    fn key_presses_accumulate_per_field() {
        let tracker = KeyboardTracker::new(1000.0);
        assert_eq!(tracker.record_key_press("email"), 1);
        assert_eq!(tracker.record_key_press("email"), 2);
        assert_eq!(tracker.record_key_press("password"), 1);
    }
}
