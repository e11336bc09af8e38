//! Signal programs as read from and written back to the simulator

use serde::{Deserialize, Serialize};

/// One phase of a signal program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPhase {
    /// Phase duration in seconds
    pub duration: f64,

    /// Signal state string (one character per controlled link, e.g. "GGrr")
    pub state: String,

    #[serde(default)]
    pub min_duration: Option<f64>,

    #[serde(default)]
    pub max_duration: Option<f64>,

    #[serde(default)]
    pub name: Option<String>,
}

impl SignalPhase {
    pub fn new(duration: f64, state: impl Into<String>) -> Self {
        Self {
            duration,
            state: state.into(),
            min_duration: None,
            max_duration: None,
            name: None,
        }
    }
}

/// Complete definition of a traffic light's running program
///
/// Always replaced as a whole: the actuator edits a copy and writes the
/// entire program back in a single simulator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalProgram {
    pub program_id: String,

    /// Program type as reported by the simulator ("static", "actuated", ...)
    #[serde(default)]
    pub program_type: String,

    /// Phase the program starts in when (re)installed
    #[serde(default)]
    pub current_phase: usize,

    pub phases: Vec<SignalPhase>,
}

impl SignalProgram {
    pub fn new(program_id: impl Into<String>, phases: Vec<SignalPhase>) -> Self {
        Self {
            program_id: program_id.into(),
            program_type: "static".to_string(),
            current_phase: 0,
            phases,
        }
    }

    /// Number of phases in one cycle
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Sum of all phase durations
    pub fn cycle_length(&self) -> f64 {
        self.phases.iter().map(|p| p.duration).sum()
    }
}

/// Where an intersection currently is within its cycle
///
/// Derived from the simulator every step; never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleState {
    pub phase_index: usize,
    pub phase_count: usize,
    /// Seconds until the signal switches to its next phase
    pub time_to_next_switch: f64,
}

impl CycleState {
    /// True when the light is in its final phase
    pub fn is_last_phase(&self) -> bool {
        self.phase_count > 0 && self.phase_index == self.phase_count - 1
    }
}
