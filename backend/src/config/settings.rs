//! Run settings (`simulation.yml`)
//!
//! ```yaml
//! config:
//!   sampling_interval_s: 10
//!   aggregation_interval_s: 50
//!   control_interval_s: 90
//!   total_simulation_time: 3600
//!   occupancy_model:
//!     road_length_m: 80.0
//! ```
//!
//! Keys used only to launch the simulator (binary, network files, gui
//! flags) live in the same mapping and are ignored here.

use super::{read_file, ConfigError};
use crate::orchestrator::PipelineConfig;
use crate::sensing::OccupancyModel;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    config: SimulationSettings,
}

/// Cadences, time budget and sensing geometry for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub sampling_interval_s: f64,
    pub aggregation_interval_s: f64,
    pub control_interval_s: f64,
    pub total_simulation_time: f64,
    pub progress_log_interval_s: f64,
    pub occupancy_model: OccupancyModel,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            sampling_interval_s: 10.0,
            aggregation_interval_s: 50.0,
            control_interval_s: 90.0,
            total_simulation_time: 3600.0,
            progress_log_interval_s: 10.0,
            occupancy_model: OccupancyModel::default(),
        }
    }
}

impl SimulationSettings {
    /// Parse the `config:` mapping of a settings document
    ///
    /// # Example
    /// ```
    /// use perimeter_control_core_rs::SimulationSettings;
    ///
    /// let settings = SimulationSettings::from_yaml_str(
    ///     "config:\n  sampling_interval_s: 5\n  gui: false\n",
    /// ).unwrap();
    /// assert_eq!(settings.sampling_interval_s, 5.0);
    /// assert_eq!(settings.aggregation_interval_s, 50.0);
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: Option<SettingsFile> = serde_yaml::from_str(yaml)?;
        match file {
            Some(file) => Ok(file.config),
            None => Err(ConfigError::Invalid(
                "settings document is empty".to_string(),
            )),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&read_file(path.as_ref())?)
    }

    /// Validate and convert into the orchestrator's configuration
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        let intervals = [
            ("sampling_interval_s", self.sampling_interval_s),
            ("aggregation_interval_s", self.aggregation_interval_s),
            ("control_interval_s", self.control_interval_s),
            ("progress_log_interval_s", self.progress_log_interval_s),
            ("total_simulation_time", self.total_simulation_time),
        ];
        for (name, value) in intervals {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be > 0, got {}",
                    name, value
                )));
            }
        }
        if self.occupancy_model.avg_vehicle_length_m <= 0.0 {
            return Err(ConfigError::Invalid(
                "occupancy_model.avg_vehicle_length_m must be > 0".to_string(),
            ));
        }

        Ok(PipelineConfig {
            sampling_interval_s: self.sampling_interval_s,
            aggregation_interval_s: self.aggregation_interval_s,
            control_interval_s: self.control_interval_s,
            total_simulation_time_s: self.total_simulation_time,
            progress_log_interval_s: self.progress_log_interval_s,
            occupancy_model: self.occupancy_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_rejected() {
        assert!(matches!(
            SimulationSettings::from_yaml_str(""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_non_positive_interval_is_rejected() {
        let settings = SimulationSettings {
            aggregation_interval_s: 0.0,
            ..Default::default()
        };
        let err = settings.to_pipeline_config().unwrap_err();
        assert!(err.to_string().contains("aggregation_interval_s"));
    }
}
