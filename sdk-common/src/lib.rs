//! Shared data model and wire contracts used by every other crate in the
//! workspace: the event/incident/tally types of §3, the presign/complete/
//! session-end DTOs of §6, and the SDK self-telemetry snapshot of §4.2.
//! Plays the role the teacher's `hook-common` crate plays for its workers.

pub mod event;
pub mod ids;
pub mod incident;
pub mod metrics;
pub mod retry;
pub mod tallies;
pub mod telemetry;
pub mod wire;

pub use event::{Event, EventKind};
pub use incident::{Incident, IncidentCategory};
pub use retry::AttemptPolicy;
pub use tallies::{Tallies, TalliesSnapshot};
pub use telemetry::{SdkTelemetry, SdkTelemetrySnapshot};
