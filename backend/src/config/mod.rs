//! Static configuration providers
//!
//! Three documents are loaded once at startup and never change during a run:
//! - `simulation.yml`: cadences, time budget, occupancy geometry
//! - `detector_config.json`: which detectors feed which measurement
//! - `intersection_config.json`: intersection to traffic light mapping,
//!   phase layout and optimization parameters
//!
//! The JSON shapes are the ones written by the network preprocessing tools.

pub mod detectors;
pub mod intersections;
pub mod settings;

pub use detectors::{DetectorConfig, IntersectionDetectors};
pub use intersections::{ConfigIssue, IntersectionConfig, OptimizationParameters};
pub use settings::SimulationSettings;

use crate::models::plan::PhaseInfo;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Lookups the actuator needs for one intersection
pub trait TopologyProvider {
    /// Traffic light controlling the intersection
    fn traffic_light_id(&self, intersection_id: &str) -> Option<String>;

    /// Which phases receive the plan's primary and secondary durations
    fn phase_info(&self, intersection_id: &str) -> Option<PhaseInfo>;
}

pub(crate) fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
