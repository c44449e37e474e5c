use std::collections::{HashMap, VecDeque};

use platform::{TouchEvent, TouchPhase, TouchPoint};

use crate::rage::{RageTapRing, TapDecision, RAGE_TAP_WINDOW_MS};

const TAP_SLOP_PX: f32 = 10.0;
const LONG_PRESS_MS: u64 = 500;
const FLING_VELOCITY_PX_PER_MS: f32 = 0.5;
const PAN_THROTTLE_MS: u64 = 100;
const PINCH_ROTATION_THROTTLE_MS: u64 = 100;
const ROTATION_THRESHOLD_RAD: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

/// The gesture vocabulary of §4.6. `target` falls back to `"view_<x>_<y>"`
/// when the host bridge hasn't supplied richer resolution.
#[derive(Debug, Clone)]
pub enum Gesture {
    Tap { x: f32, y: f32, target: String },
    LongPress { x: f32, y: f32, target: String, duration_ms: u64 },
    RageTap { x: f32, y: f32, target: String, count: usize },
    DeadTap { x: f32, y: f32, target: String },
    Pan { x: f32, y: f32, dx: f32, dy: f32 },
    Scroll { dx: f32, dy: f32 },
    Swipe { direction: SwipeDirection, x: f32, y: f32, velocity_px_ms: f32 },
    Pinch { scale: f32, terminal: bool },
    Rotation { angle_rad: f32 },
}

fn fallback_target(x: f32, y: f32) -> String {
    format!("view_{}_{}", x as i64, y as i64)
}

struct SinglePointer {
    pointer_id: u64,
    start: (f32, f32),
    start_ms: u64,
    last: (f32, f32),
    last_ms: u64,
    moved: bool,
    last_pan_emit_ms: u64,
}

struct TwoPointer {
    ids: (u64, u64),
    initial_distance: f32,
    initial_angle: f32,
    last_scale_emit_ms: u64,
    last_angle_emit_ms: u64,
    last_angle: f32,
}

struct PendingTap {
    x: f32,
    y: f32,
    target: String,
    ts_ms: u64,
}

/// Converts a raw touch stream into the semantic gesture vocabulary.
/// Single-owner, not `Send`/`Sync` by itself — callers serialize access
/// (§4.6: the recorder installs one non-consuming tap per foreground
/// window).
pub struct GestureClassifier {
    points: HashMap<u64, TouchPoint>,
    single: Option<SinglePointer>,
    two: Option<TwoPointer>,
    rage: RageTapRing,
    pending_taps: VecDeque<PendingTap>,
}

impl GestureClassifier {
    pub fn new() -> Self {
        Self {
            points: HashMap::new(),
            single: None,
            two: None,
            rage: RageTapRing::new(),
            pending_taps: VecDeque::new(),
        }
    }

    /// Feeds one raw touch sample; returns every gesture it completes or
    /// throttled-emits as a result. Usually zero or one, occasionally more
    /// (e.g. a pointer-up can emit both a terminal pinch and nothing else).
    ///
    /// A plain tap is never returned the instant it happens: it sits in
    /// `pending_taps` until the rage-tap window (§4.6) elapses without a
    /// cluster forming, since a later tap within that window could still
    /// turn it into part of a `rageTap` instead. Every call flushes
    /// whichever pending taps have aged out, so a tap is eventually
    /// reported exactly once no matter what gesture the caller is feeding
    /// in next.
    pub fn on_touch(&mut self, event: &TouchEvent) -> Vec<Gesture> {
        let mut gestures = self.flush_expired_taps(event.timestamp_ms);
        gestures.extend(match event.phase {
            TouchPhase::Down => self.on_down(event),
            TouchPhase::Move => self.on_move(event),
            TouchPhase::Up => self.on_up(event),
            TouchPhase::Cancel => {
                self.reset();
                Vec::new()
            }
        });
        gestures
    }

    /// Pops every pending tap old enough that `RageTapRing` would already
    /// have pruned it from consideration, and reports it as a real `Tap`.
    fn flush_expired_taps(&mut self, now_ms: u64) -> Vec<Gesture> {
        let mut flushed = Vec::new();
        while let Some(pending) = self.pending_taps.front() {
            if now_ms.saturating_sub(pending.ts_ms) <= RAGE_TAP_WINDOW_MS {
                break;
            }
            let pending = self.pending_taps.pop_front().unwrap();
            flushed.push(Gesture::Tap { x: pending.x, y: pending.y, target: pending.target });
        }
        flushed
    }

    fn on_down(&mut self, event: &TouchEvent) -> Vec<Gesture> {
        for point in &event.points {
            self.points.insert(point.pointer_id, *point);
        }

        match self.points.len() {
            1 => {
                let point = *self.points.values().next().unwrap();
                self.single = Some(SinglePointer {
                    pointer_id: point.pointer_id,
                    start: (point.x, point.y),
                    start_ms: event.timestamp_ms,
                    last: (point.x, point.y),
                    last_ms: event.timestamp_ms,
                    moved: false,
                    last_pan_emit_ms: event.timestamp_ms,
                });
            }
            2 => {
                self.single = None;
                let mut ids: Vec<u64> = self.points.keys().copied().collect();
                ids.sort_unstable();
                let a = self.points[&ids[0]];
                let b = self.points[&ids[1]];
                let distance = euclidean((a.x, a.y), (b.x, b.y));
                let angle = (b.y - a.y).atan2(b.x - a.x);
                self.two = Some(TwoPointer {
                    ids: (ids[0], ids[1]),
                    initial_distance: distance.max(1.0),
                    initial_angle: angle,
                    last_scale_emit_ms: event.timestamp_ms,
                    last_angle_emit_ms: event.timestamp_ms,
                    last_angle: angle,
                });
            }
            _ => {
                // More than two simultaneous pointers aren't modeled as a
                // distinct gesture; fall back to tracking nothing until the
                // extra pointers lift.
                self.single = None;
                self.two = None;
            }
        }

        Vec::new()
    }

    fn on_move(&mut self, event: &TouchEvent) -> Vec<Gesture> {
        for point in &event.points {
            self.points.insert(point.pointer_id, *point);
        }

        if let Some(two) = &mut self.two {
            return move_two_pointer(two, &self.points, event.timestamp_ms);
        }

        if let Some(single) = &mut self.single {
            return move_single_pointer(single, &self.points, event.timestamp_ms);
        }

        Vec::new()
    }

    fn on_up(&mut self, event: &TouchEvent) -> Vec<Gesture> {
        let mut gestures = Vec::new();

        if let Some(two) = self.two.take() {
            if let (Some(&a), Some(&b)) = (self.points.get(&two.ids.0), self.points.get(&two.ids.1)) {
                let distance = euclidean((a.x, a.y), (b.x, b.y));
                let scale = distance / two.initial_distance;
                gestures.push(Gesture::Pinch { scale, terminal: true });
            }
            for point in &event.points {
                self.points.remove(&point.pointer_id);
            }
            return gestures;
        }

        if let Some(single) = self.single.take() {
            let up_point = event
                .points
                .iter()
                .find(|p| p.pointer_id == single.pointer_id)
                .copied()
                .unwrap_or(TouchPoint {
                    pointer_id: single.pointer_id,
                    x: single.last.0,
                    y: single.last.1,
                });

            let duration_ms = event.timestamp_ms.saturating_sub(single.start_ms);
            let total_distance = euclidean(single.start, (up_point.x, up_point.y));
            let target = event
                .target_hint
                .clone()
                .unwrap_or_else(|| fallback_target(up_point.x, up_point.y));

            if total_distance <= TAP_SLOP_PX {
                if duration_ms >= LONG_PRESS_MS {
                    gestures.push(Gesture::LongPress {
                        x: up_point.x,
                        y: up_point.y,
                        target,
                        duration_ms,
                    });
                } else if event.is_dead_tap_hint {
                    gestures.push(Gesture::DeadTap {
                        x: up_point.x,
                        y: up_point.y,
                        target,
                    });
                } else {
                    match self.rage.record_tap((up_point.x, up_point.y), event.timestamp_ms) {
                        TapDecision::Tap => self.pending_taps.push_back(PendingTap {
                            x: up_point.x,
                            y: up_point.y,
                            target,
                            ts_ms: event.timestamp_ms,
                        }),
                        TapDecision::RageTap { count } => {
                            self.pending_taps.clear();
                            gestures.push(Gesture::RageTap {
                                x: up_point.x,
                                y: up_point.y,
                                target,
                                count,
                            });
                        }
                    }
                }
            } else {
                let elapsed_ms = (event.timestamp_ms.saturating_sub(single.last_ms)).max(1);
                let vx = (up_point.x - single.last.0) / elapsed_ms as f32;
                let vy = (up_point.y - single.last.1) / elapsed_ms as f32;
                let velocity = (vx * vx + vy * vy).sqrt();

                if velocity >= FLING_VELOCITY_PX_PER_MS {
                    let direction = if vx.abs() >= vy.abs() {
                        if vx >= 0.0 { SwipeDirection::Right } else { SwipeDirection::Left }
                    } else if vy >= 0.0 {
                        SwipeDirection::Down
                    } else {
                        SwipeDirection::Up
                    };
                    gestures.push(Gesture::Swipe {
                        direction,
                        x: up_point.x,
                        y: up_point.y,
                        velocity_px_ms: velocity,
                    });
                } else {
                    gestures.push(Gesture::Scroll {
                        dx: up_point.x - single.start.0,
                        dy: up_point.y - single.start.1,
                    });
                }
            }
        }

        for point in &event.points {
            self.points.remove(&point.pointer_id);
        }

        gestures
    }

    fn reset(&mut self) {
        self.points.clear();
        self.single = None;
        self.two = None;
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn move_single_pointer(
    single: &mut SinglePointer,
    points: &HashMap<u64, TouchPoint>,
    now_ms: u64,
) -> Vec<Gesture> {
    let Some(&point) = points.get(&single.pointer_id) else {
        return Vec::new();
    };

    let total_distance = euclidean(single.start, (point.x, point.y));
    if total_distance > TAP_SLOP_PX {
        single.moved = true;
    }

    let mut gestures = Vec::new();
    if single.moved && now_ms.saturating_sub(single.last_pan_emit_ms) >= PAN_THROTTLE_MS {
        gestures.push(Gesture::Pan {
            x: point.x,
            y: point.y,
            dx: point.x - single.last.0,
            dy: point.y - single.last.1,
        });
        single.last_pan_emit_ms = now_ms;
    }

    single.last = (point.x, point.y);
    single.last_ms = now_ms;
    gestures
}

fn move_two_pointer(two: &mut TwoPointer, points: &HashMap<u64, TouchPoint>, now_ms: u64) -> Vec<Gesture> {
    let (Some(&a), Some(&b)) = (points.get(&two.ids.0), points.get(&two.ids.1)) else {
        return Vec::new();
    };

    let mut gestures = Vec::new();
    let distance = euclidean((a.x, a.y), (b.x, b.y));
    let angle = (b.y - a.y).atan2(b.x - a.x);

    if now_ms.saturating_sub(two.last_scale_emit_ms) >= PINCH_ROTATION_THROTTLE_MS {
        let scale = distance / two.initial_distance;
        gestures.push(Gesture::Pinch { scale, terminal: false });
        two.last_scale_emit_ms = now_ms;
    }

    let angle_delta = angle_diff(angle, two.last_angle);
    if angle_delta.abs() > ROTATION_THRESHOLD_RAD
        && now_ms.saturating_sub(two.last_angle_emit_ms) >= PINCH_ROTATION_THROTTLE_MS
    {
        gestures.push(Gesture::Rotation {
            angle_rad: angle - two.initial_angle,
        });
        two.last_angle_emit_ms = now_ms;
        two.last_angle = angle;
    }

    gestures
}

fn angle_diff(a: f32, b: f32) -> f32 {
    let mut diff = a - b;
    while diff > std::f32::consts::PI {
        diff -= 2.0 * std::f32::consts::PI;
    }
    while diff < -std::f32::consts::PI {
        diff += 2.0 * std::f32::consts::PI;
    }
    diff
}

fn euclidean(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(phase: TouchPhase, points: Vec<TouchPoint>, ts: u64) -> TouchEvent {
        TouchEvent {
            phase,
            points,
            timestamp_ms: ts,
            target_hint: None,
            is_dead_tap_hint: false,
        }
    }

    fn point(id: u64, x: f32, y: f32) -> TouchPoint {
        TouchPoint { pointer_id: id, x, y }
    }

    #[test]
    fn short_tap_within_slop_is_a_tap() {
        let mut classifier = GestureClassifier::new();
        classifier.on_touch(&touch(TouchPhase::Down, vec![point(1, 100.0, 100.0)], 0));
        let gestures = classifier.on_touch(&touch(TouchPhase::Up, vec![point(1, 102.0, 101.0)], 50));
        assert!(gestures.is_empty(), "a tap is buffered, not reported immediately");

        let flushed = classifier.on_touch(&touch(TouchPhase::Down, vec![point(2, 300.0, 300.0)], 2_000));
        assert!(matches!(flushed.as_slice(), [Gesture::Tap { .. }]));
    }

    #[test]
    fn held_pointer_beyond_threshold_is_a_long_press() {
        let mut classifier = GestureClassifier::new();
        classifier.on_touch(&touch(TouchPhase::Down, vec![point(1, 100.0, 100.0)], 0));
        let gestures = classifier.on_touch(&touch(TouchPhase::Up, vec![point(1, 100.0, 100.0)], 600));
        assert!(matches!(gestures.as_slice(), [Gesture::LongPress { duration_ms: 600, .. }]));
    }

    #[test]
    fn dead_tap_hint_overrides_tap_when_within_slop() {
        let mut classifier = GestureClassifier::new();
        classifier.on_touch(&touch(TouchPhase::Down, vec![point(1, 100.0, 100.0)], 0));
        let mut up = touch(TouchPhase::Up, vec![point(1, 100.0, 100.0)], 50);
        up.is_dead_tap_hint = true;
        let gestures = classifier.on_touch(&up);
        assert!(matches!(gestures.as_slice(), [Gesture::DeadTap { .. }]));
    }

    #[test]
    fn three_quick_close_taps_emit_rage_tap_not_three_taps() {
        let mut classifier = GestureClassifier::new();
        let mut gestures = Vec::new();
        for (i, ts) in [(0u64, 0u64), (1, 200), (2, 400)] {
            classifier.on_touch(&touch(TouchPhase::Down, vec![point(i, 100.0, 100.0)], ts));
            gestures.extend(classifier.on_touch(&touch(TouchPhase::Up, vec![point(i, 101.0, 100.0)], ts + 10)));
        }
        assert_eq!(gestures.len(), 1, "clustered taps must produce no standalone tap events");
        assert!(matches!(gestures[0], Gesture::RageTap { count: 3, .. }));
    }

    #[test]
    fn a_tap_flushes_once_the_rage_window_elapses_without_a_cluster() {
        let mut classifier = GestureClassifier::new();
        classifier.on_touch(&touch(TouchPhase::Down, vec![point(1, 100.0, 100.0)], 0));
        let immediate = classifier.on_touch(&touch(TouchPhase::Up, vec![point(1, 101.0, 100.0)], 10));
        assert!(immediate.is_empty(), "a tap must not be reported before the rage window can rule it out");

        // Well past the 1000ms rage-tap window: the lone tap above can no
        // longer join a cluster and must flush as a real Tap.
        let flushed = classifier.on_touch(&touch(TouchPhase::Down, vec![point(2, 500.0, 500.0)], 1_500));
        assert_eq!(flushed.len(), 1);
        assert!(matches!(flushed[0], Gesture::Tap { x, .. } if x == 100.0));
    }

    #[test]
    fn slow_drag_without_fling_emits_scroll() {
        let mut classifier = GestureClassifier::new();
        classifier.on_touch(&touch(TouchPhase::Down, vec![point(1, 0.0, 0.0)], 0));
        classifier.on_touch(&touch(TouchPhase::Move, vec![point(1, 0.0, 50.0)], 400));
        let gestures = classifier.on_touch(&touch(TouchPhase::Up, vec![point(1, 0.0, 60.0)], 800));
        assert!(matches!(gestures.as_slice(), [Gesture::Scroll { .. }]));
    }

    #[test]
    fn fast_release_emits_swipe_with_dominant_direction() {
        let mut classifier = GestureClassifier::new();
        classifier.on_touch(&touch(TouchPhase::Down, vec![point(1, 0.0, 0.0)], 0));
        classifier.on_touch(&touch(TouchPhase::Move, vec![point(1, 300.0, 0.0)], 50));
        let gestures = classifier.on_touch(&touch(TouchPhase::Up, vec![point(1, 600.0, 0.0)], 100));
        match gestures.as_slice() {
            [Gesture::Swipe { direction, .. }] => assert_eq!(*direction, SwipeDirection::Right),
            other => panic!("expected swipe, got {other:?}"),
        }
    }

    #[test]
    fn two_finger_pinch_open_increases_scale() {
        let mut classifier = GestureClassifier::new();
        classifier.on_touch(&touch(
            TouchPhase::Down,
            vec![point(1, 100.0, 100.0), point(2, 200.0, 100.0)],
            0,
        ));
        let gestures = classifier.on_touch(&touch(
            TouchPhase::Move,
            vec![point(1, 50.0, 100.0), point(2, 250.0, 100.0)],
            150,
        ));
        match gestures.first() {
            Some(Gesture::Pinch { scale, terminal: false }) => assert!(*scale > 1.0),
            other => panic!("expected throttled pinch, got {other:?}"),
        }
    }
}
