//! C6 — InteractionRecorder: converts a raw touch stream into the semantic
//! gesture vocabulary, tracks keyboard visibility and the navigation stack,
//! and tallies gesture counts for the session-health decision (§4.6).

pub mod gesture;
pub mod keyboard;
pub mod navigation;
pub mod rage;
pub mod recorder;

pub use gesture::{Gesture, GestureClassifier, SwipeDirection};
pub use keyboard::{KeyboardEvent, KeyboardTracker};
pub use navigation::{NavigationStack, ViewTransition};
pub use recorder::InteractionRecorder;
