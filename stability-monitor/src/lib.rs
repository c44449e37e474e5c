//! C4 — StabilityMonitor: installs the uncaught-exception handler, captures
//! and persists crash incidents, and ships them to `/api/ingest/fault`.
//! Shares its on-disk incident slot (`rj_incidents.json`) with `anr-sentinel`,
//! which tags its own incidents with `IncidentCategory::Anr` (§4.4, §4.5).

pub mod monitor;
pub mod store;
pub mod upload;

pub use monitor::StabilityMonitor;
pub use store::IncidentStore;
pub use upload::FaultUploader;
