//! Simulator contract
//!
//! The traffic simulator is an external, stepped process. The pipeline talks
//! to it only through the `Simulator` trait, and only from the single thread
//! that owns the driver loop. Implementations wrap a live connection (see the
//! `ffi` module for a Python-hosted one); tests use a scripted in-memory one.
//!
//! # Error Taxonomy
//!
//! - `Transient`: a query failed but the connection is healthy
//! - `UnknownEntity`: the simulator does not know the requested id
//! - `ConnectionClosed`: fatal, the run must shut down
//! - `Other`: anything unexpected, surfaced distinctly

pub mod scripted;

use crate::models::signal::SignalProgram;
use thiserror::Error;

/// Errors reported by a simulator connection
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulatorError {
    #[error("Transient simulator error: {0}")]
    Transient(String),

    #[error("{kind} '{id}' does not exist")]
    UnknownEntity { kind: &'static str, id: String },

    #[error("Simulator connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Unexpected simulator error: {0}")]
    Other(String),
}

impl SimulatorError {
    /// True when the connection can no longer be used
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimulatorError::ConnectionClosed(_))
    }

    pub fn is_unknown_entity(&self) -> bool {
        matches!(self, SimulatorError::UnknownEntity { .. })
    }
}

pub type SimResult<T> = Result<T, SimulatorError>;

/// Stepped traffic simulator
///
/// All methods take `&mut self`: every call is I/O on the single connection.
pub trait Simulator {
    /// Advance simulated time by one step
    fn step(&mut self) -> SimResult<()>;

    /// Current simulated time (seconds)
    fn time(&mut self) -> SimResult<f64>;

    /// Fixed duration of one step (seconds)
    fn step_length(&mut self) -> SimResult<f64>;

    /// Vehicles still in the network or waiting to enter it
    fn min_expected_vehicles(&mut self) -> SimResult<usize>;

    /// Spatial occupancy (percent, 0-100) of a lane-area detector over its last interval
    fn last_interval_occupancy(&mut self, detector_id: &str) -> SimResult<f64>;

    /// The program the traffic light is currently running, if it can be found
    fn active_program(&mut self, traffic_light_id: &str) -> SimResult<Option<SignalProgram>>;

    /// Replace the traffic light's program definition in one call
    fn set_program(&mut self, traffic_light_id: &str, program: &SignalProgram) -> SimResult<()>;

    /// Index of the phase the traffic light is currently in
    fn current_phase(&mut self, traffic_light_id: &str) -> SimResult<usize>;

    /// Absolute simulated time of the traffic light's next phase switch
    fn next_switch(&mut self, traffic_light_id: &str) -> SimResult<f64>;

    /// Close the connection
    fn close(&mut self) -> SimResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SimulatorError::ConnectionClosed("eof".into()).is_fatal());
        assert!(!SimulatorError::Transient("timeout".into()).is_fatal());

        let missing = SimulatorError::UnknownEntity {
            kind: "Traffic light",
            id: "TL9".to_string(),
        };
        assert!(missing.is_unknown_entity());
        assert_eq!(missing.to_string(), "Traffic light 'TL9' does not exist");
    }
}
