/// Posts a closure to the host's main/UI thread. Used by `AnrSentinel`'s
/// watchdog to ping the main thread, and by `VisualCapture` to request
/// immediate out-of-band snapshots (navigation, map idle).
///
/// A failed `post` is indistinguishable from a hang from the watchdog's
/// point of view, and the spec allows that ambiguity to trigger an ANR
/// report rather than trying to special-case it.
pub trait MainThreadExecutor: Send + Sync {
    /// Returns `true` if the closure was successfully queued (not
    /// necessarily executed yet).
    fn post(&self, job: Box<dyn FnOnce() + Send>) -> bool;
}

/// Captures the main thread's current stack for an ANR report. The Rust
/// core never symbolicates (see Non-goals) — frames arrive pre-resolved to
/// `file:line` the same way `HostThrowable::frames` does.
pub trait MainThreadStackProvider: Send + Sync {
    fn capture_stack(&self) -> Vec<crate::stability_caps::StackFrame>;
}
