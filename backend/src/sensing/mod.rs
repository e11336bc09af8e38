//! Detector sampling
//!
//! Converts raw lane-area detector occupancy into vehicle-accumulation
//! estimates. A sampling call never fails on a bad detector: the whole call
//! degrades to the documented default of 0 vehicles, which self-corrects at
//! the next sampling boundary. Only a closed connection is propagated.

use crate::simulator::{SimResult, Simulator, SimulatorError};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Value substituted for a sampling call that could not be completed
pub const DEGRADED_READING: f64 = 0.0;

/// Geometry used to turn spatial occupancy into a vehicle count
///
/// `vehicles = road_length * (lane_count / (100 * avg_vehicle_length)) * occupancy_percent`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyModel {
    pub road_length_m: f64,
    pub lane_count: u32,
    pub avg_vehicle_length_m: f64,
}

impl Default for OccupancyModel {
    fn default() -> Self {
        Self {
            road_length_m: 80.0,
            lane_count: 1,
            avg_vehicle_length_m: 3.0,
        }
    }
}

impl OccupancyModel {
    /// Vehicle estimate for one detector
    ///
    /// # Example
    /// ```
    /// use perimeter_control_core_rs::OccupancyModel;
    ///
    /// let model = OccupancyModel::default();
    /// let vehicles = model.vehicles(50.0);
    /// assert!((vehicles - 13.333).abs() < 1e-3);
    /// ```
    pub fn vehicles(&self, occupancy_percent: f64) -> f64 {
        let occupancy = occupancy_percent.clamp(0.0, 100.0);
        self.road_length_m
            * (self.lane_count as f64 / (100.0 * self.avg_vehicle_length_m))
            * occupancy
    }
}

/// Result of sampling a detector group
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// All detectors answered
    Measured(f64),
    /// At least one query failed; the reading is `DEGRADED_READING`
    Degraded,
}

impl Reading {
    pub fn value(&self) -> f64 {
        match self {
            Reading::Measured(v) => *v,
            Reading::Degraded => DEGRADED_READING,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Reading::Degraded)
    }
}

/// Reads detector groups and sums their accumulation estimates
#[derive(Debug, Clone, Default)]
pub struct DetectorSampler {
    model: OccupancyModel,
}

impl DetectorSampler {
    pub fn new(model: OccupancyModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &OccupancyModel {
        &self.model
    }

    /// Sum the accumulation estimate over a detector group
    ///
    /// # Returns
    ///
    /// * `Ok(Reading::Measured(sum))` - every detector answered (0 for an empty group)
    /// * `Ok(Reading::Degraded)` - a query failed; partial sums are discarded
    /// * `Err(SimulatorError)` - the connection is closed
    pub fn sample<S>(&self, sim: &mut S, detector_ids: &[String]) -> SimResult<Reading>
    where
        S: Simulator + ?Sized,
    {
        let mut total = 0.0;
        for detector_id in detector_ids {
            match sim.last_interval_occupancy(detector_id) {
                Ok(occupancy) => total += self.model.vehicles(occupancy),
                Err(err) if err.is_fatal() => return Err(err),
                Err(SimulatorError::Other(msg)) => {
                    error!(detector_id = %detector_id, error = %msg, "unexpected failure reading detector, reading degraded to default");
                    return Ok(Reading::Degraded);
                }
                Err(err) => {
                    warn!(detector_id = %detector_id, error = %err, "detector query failed, reading degraded to default");
                    return Ok(Reading::Degraded);
                }
            }
        }
        Ok(Reading::Measured(total))
    }
}
