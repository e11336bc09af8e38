//! Domain models for the perimeter control pipeline

pub mod event;
pub mod measurement;
pub mod plan;
pub mod signal;

// Re-exports
pub use event::{Event, EventLog};
pub use measurement::{AggregatedMeasurement, QueueMeasurement};
pub use plan::{GreenTimePlan, PhaseInfo};
pub use signal::{CycleState, SignalPhase, SignalProgram};
