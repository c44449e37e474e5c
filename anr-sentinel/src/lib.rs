//! C5 — AnrSentinel: a daemon watchdog thread detecting main-thread hangs
//! via ping/pong, persisting ANR incidents through the same store
//! StabilityMonitor uses for crashes (§4.5).

pub mod watchdog;

pub use watchdog::{AnrReport, AnrSentinel};
