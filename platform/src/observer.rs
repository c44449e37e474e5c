use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A handle returned by a `register()`-style call. Dropping it unregisters
/// the callback it represents.
///
/// The source SDK keeps weak-reference lists of UI callbacks and views for
/// redaction and gesture installation; a systems-language rewrite has no
/// weak references to raw view pointers, so registration instead returns
/// this handle. The host adapter owns the handle's lifetime, and there is no
/// global mutable registry of view pointers on the Rust side.
pub struct ObserverHandle {
    active: Arc<AtomicBool>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl ObserverHandle {
    pub fn new(active: Arc<AtomicBool>, on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            active,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// A handle with nothing to unregister, for fake capability
    /// implementations in tests.
    pub fn noop() -> Self {
        Self::new(Arc::new(AtomicBool::new(true)), || {})
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(f) = self.on_drop.take() {
            f();
        }
    }
}
