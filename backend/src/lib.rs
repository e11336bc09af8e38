//! Perimeter Control Core - Rust Engine
//!
//! Measurement-aggregation and cycle-synchronized actuation pipeline for
//! perimeter (gating) traffic-signal control against a stepped simulator.
//!
//! # Architecture
//!
//! - **core**: Drift-free cadence timers
//! - **config**: Static configuration documents and topology lookups
//! - **models**: Domain types (plans, signal programs, measurements, events)
//! - **simulator**: Simulator contract and a scripted in-memory double
//! - **sensing**: Detector occupancy to vehicle accumulation
//! - **aggregation**: Sample buffers and means
//! - **control**: Controller interface, plan hand-off channel, adapter
//! - **actuation**: Pending plan store and cycle-synchronized actuator
//! - **orchestrator**: Main stepping loop
//!
//! # Critical Invariants
//!
//! 1. Only the orchestrator touches the simulator, from one thread
//! 2. A plan lands only when its intersection is about to start a new cycle
//! 3. At most one pending plan per intersection (last writer wins)
//! 4. Sample buffers are emptied exactly once per aggregation event

// Module declarations
pub mod actuation;
pub mod aggregation;
pub mod config;
pub mod control;
pub mod core;
pub mod models;
pub mod orchestrator;
pub mod sensing;
pub mod simulator;

// Re-exports for convenience
pub use actuation::{ActuationOutcome, CycleSyncActuator, PendingPlanStore};
pub use aggregation::SampleBuffers;
pub use config::{
    ConfigError, DetectorConfig, IntersectionConfig, SimulationSettings, TopologyProvider,
};
pub use control::{
    ControlError, ControlInput, ControlOutput, Controller, ControllerAdapter, PlanChannel,
};
pub use crate::core::time::CadenceTimer;
pub use models::{
    event::{Event, EventLog},
    measurement::{AggregatedMeasurement, QueueMeasurement},
    plan::{GreenTimePlan, PhaseInfo},
    signal::{CycleState, SignalPhase, SignalProgram},
};
pub use orchestrator::{
    Orchestrator, PipelineConfig, PipelineError, RunSummary, StepResult, StopReason,
};
pub use sensing::{DetectorSampler, OccupancyModel, Reading};
pub use simulator::{SimResult, Simulator, SimulatorError};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn perimeter_control_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::pipeline::PyPipeline>()?;
    Ok(())
}
