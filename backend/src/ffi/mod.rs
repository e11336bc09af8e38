//! Python bindings
//!
//! Exposes the pipeline as a `Pipeline` class that drives a simulator and a
//! controller living on the Python side.

pub mod pipeline;
pub mod types;
