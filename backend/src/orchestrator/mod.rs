//! Orchestrator - main stepping loop
//!
//! Implements the multi-rate scheduler driving sampling, aggregation,
//! control and actuation against the simulator.
//!
//! See `engine.rs` for full implementation.

pub mod engine;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use engine::{
    Orchestrator, PipelineConfig, PipelineError, RunSummary, StepResult, StopReason,
};
