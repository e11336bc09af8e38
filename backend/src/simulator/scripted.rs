//! Scripted in-memory simulator
//!
//! A deterministic stand-in for a live simulator connection. Traffic lights
//! cycle through their programs in simulated time, detectors report fixed
//! occupancies, and failures can be injected per detector or per traffic
//! light.
//!
//! NOTE: Available in all builds to support integration testing and dry
//! runs, but carries no traffic model: vehicles never move.

use super::{SimResult, Simulator, SimulatorError};
use crate::models::signal::SignalProgram;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct ScriptedLight {
    program: SignalProgram,
    phase_index: usize,
    /// Absolute time the current phase ends
    phase_end: f64,
    program_visible: bool,
    failure: Option<SimulatorError>,
}

impl ScriptedLight {
    fn advance_to(&mut self, time: f64) {
        if self.program.cycle_length() <= 0.0 {
            return;
        }
        while time >= self.phase_end {
            self.phase_index = (self.phase_index + 1) % self.program.phase_count();
            self.phase_end += self.program.phases[self.phase_index].duration;
        }
    }
}

/// A program write observed by the scripted simulator
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramWrite {
    pub time: f64,
    pub traffic_light_id: String,
    pub program: SignalProgram,
}

/// Deterministic simulator double
///
/// # Example
/// ```
/// use perimeter_control_core_rs::simulator::{scripted::ScriptedSimulator, Simulator};
///
/// let mut sim = ScriptedSimulator::new(1.0);
/// sim.set_occupancy("e2_0", 50.0);
/// sim.step().unwrap();
/// assert_eq!(sim.time().unwrap(), 1.0);
/// assert_eq!(sim.last_interval_occupancy("e2_0").unwrap(), 50.0);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedSimulator {
    step_length: f64,
    time: f64,
    steps: usize,
    expected_vehicles: usize,
    vehicles_until: Option<f64>,
    close_at: Option<f64>,
    closed: bool,
    occupancy: BTreeMap<String, f64>,
    failing_detectors: BTreeMap<String, SimulatorError>,
    lights: BTreeMap<String, ScriptedLight>,
    writes: Vec<ProgramWrite>,
}

impl ScriptedSimulator {
    pub fn new(step_length: f64) -> Self {
        assert!(step_length > 0.0, "step_length must be positive");
        Self {
            step_length,
            time: 0.0,
            steps: 0,
            expected_vehicles: 1,
            vehicles_until: None,
            close_at: None,
            closed: false,
            occupancy: BTreeMap::new(),
            failing_detectors: BTreeMap::new(),
            lights: BTreeMap::new(),
            writes: Vec::new(),
        }
    }

    /// Report `occupancy_percent` for a detector
    pub fn set_occupancy(&mut self, detector_id: impl Into<String>, occupancy_percent: f64) {
        self.occupancy.insert(detector_id.into(), occupancy_percent);
    }

    /// Make every query of this detector fail with a transient error
    pub fn fail_detector(&mut self, detector_id: impl Into<String>) {
        let detector_id = detector_id.into();
        let message = format!("no answer from detector {}", detector_id);
        self.failing_detectors
            .insert(detector_id, SimulatorError::Transient(message));
    }

    /// Make every query of this detector fail with `error`
    pub fn fail_detector_with(&mut self, detector_id: impl Into<String>, error: SimulatorError) {
        self.failing_detectors.insert(detector_id.into(), error);
    }

    pub fn restore_detector(&mut self, detector_id: &str) {
        self.failing_detectors.remove(detector_id);
    }

    /// Install a traffic light starting phase 0 at the current time
    pub fn add_traffic_light(
        &mut self,
        traffic_light_id: impl Into<String>,
        program: SignalProgram,
    ) {
        let phase_end = self.time + program.phases.first().map_or(0.0, |p| p.duration);
        self.lights.insert(
            traffic_light_id.into(),
            ScriptedLight {
                program,
                phase_index: 0,
                phase_end,
                program_visible: true,
                failure: None,
            },
        );
    }

    pub fn remove_traffic_light(&mut self, traffic_light_id: &str) {
        self.lights.remove(traffic_light_id);
    }

    /// Put a light in `phase_index` with `remaining` seconds left in that phase
    pub fn set_phase(&mut self, traffic_light_id: &str, phase_index: usize, remaining: f64) {
        if let Some(light) = self.lights.get_mut(traffic_light_id) {
            light.phase_index = phase_index;
            light.phase_end = self.time + remaining;
        }
    }

    /// Hide a light's running program (the light itself still answers)
    pub fn hide_program(&mut self, traffic_light_id: &str) {
        if let Some(light) = self.lights.get_mut(traffic_light_id) {
            light.program_visible = false;
        }
    }

    /// Make every query of this light fail with `error`; `None` clears it
    pub fn fail_traffic_light(&mut self, traffic_light_id: &str, error: Option<SimulatorError>) {
        if let Some(light) = self.lights.get_mut(traffic_light_id) {
            light.failure = error;
        }
    }

    /// Report `count` expected vehicles
    pub fn set_expected_vehicles(&mut self, count: usize) {
        self.expected_vehicles = count;
    }

    /// Report no vehicles from simulated time `time` on
    pub fn vehicles_until(&mut self, time: f64) {
        self.vehicles_until = Some(time);
    }

    /// Close the connection on the first step reaching `time`
    pub fn close_at(&mut self, time: f64) {
        self.close_at = Some(time);
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Program currently installed on a light
    pub fn program(&self, traffic_light_id: &str) -> Option<&SignalProgram> {
        self.lights.get(traffic_light_id).map(|l| &l.program)
    }

    /// Every `set_program` call, in order
    pub fn program_writes(&self) -> &[ProgramWrite] {
        &self.writes
    }

    fn ensure_open(&self) -> SimResult<()> {
        if self.closed {
            Err(SimulatorError::ConnectionClosed(
                "connection already closed".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn light(&mut self, traffic_light_id: &str) -> SimResult<&mut ScriptedLight> {
        self.ensure_open()?;
        let light = self
            .lights
            .get_mut(traffic_light_id)
            .ok_or_else(|| SimulatorError::UnknownEntity {
                kind: "Traffic light",
                id: traffic_light_id.to_string(),
            })?;
        if let Some(err) = light.failure.clone() {
            return Err(err);
        }
        Ok(light)
    }
}

impl Simulator for ScriptedSimulator {
    fn step(&mut self) -> SimResult<()> {
        self.ensure_open()?;
        let next = self.time + self.step_length;
        if self.close_at.is_some_and(|t| next >= t) {
            self.closed = true;
            return Err(SimulatorError::ConnectionClosed(
                "peer shut down".to_string(),
            ));
        }
        self.time = next;
        self.steps += 1;
        for light in self.lights.values_mut() {
            light.advance_to(next);
        }
        Ok(())
    }

    fn time(&mut self) -> SimResult<f64> {
        self.ensure_open()?;
        Ok(self.time)
    }

    fn step_length(&mut self) -> SimResult<f64> {
        self.ensure_open()?;
        Ok(self.step_length)
    }

    fn min_expected_vehicles(&mut self) -> SimResult<usize> {
        self.ensure_open()?;
        match self.vehicles_until {
            Some(until) if self.time >= until => Ok(0),
            _ => Ok(self.expected_vehicles),
        }
    }

    fn last_interval_occupancy(&mut self, detector_id: &str) -> SimResult<f64> {
        self.ensure_open()?;
        if let Some(error) = self.failing_detectors.get(detector_id) {
            return Err(error.clone());
        }
        self.occupancy
            .get(detector_id)
            .copied()
            .ok_or_else(|| SimulatorError::UnknownEntity {
                kind: "Lane area detector",
                id: detector_id.to_string(),
            })
    }

    fn active_program(&mut self, traffic_light_id: &str) -> SimResult<Option<SignalProgram>> {
        let light = self.light(traffic_light_id)?;
        Ok(light.program_visible.then(|| light.program.clone()))
    }

    fn set_program(&mut self, traffic_light_id: &str, program: &SignalProgram) -> SimResult<()> {
        let time = self.time;
        let light = self.light(traffic_light_id)?;
        light.program = program.clone();
        if light.phase_index >= light.program.phase_count() {
            light.phase_index = 0;
        }
        self.writes.push(ProgramWrite {
            time,
            traffic_light_id: traffic_light_id.to_string(),
            program: program.clone(),
        });
        Ok(())
    }

    fn current_phase(&mut self, traffic_light_id: &str) -> SimResult<usize> {
        Ok(self.light(traffic_light_id)?.phase_index)
    }

    fn next_switch(&mut self, traffic_light_id: &str) -> SimResult<f64> {
        Ok(self.light(traffic_light_id)?.phase_end)
    }

    fn close(&mut self) -> SimResult<()> {
        self.closed = true;
        Ok(())
    }
}
