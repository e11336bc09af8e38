//! Detector grouping document
//!
//! ```json
//! {
//!   "algorithm_input_detectors": { "detector_ids": ["e2_0", "e2_1"] },
//!   "mfd_input_flow_detectors": { "detector_ids": ["e1_0"] },
//!   "solver_input_detectors": {
//!     "intersections": {
//!       "J1": { "phases": {
//!         "p": { "queue_detectors": ["e2_0"], "queue2_detector": ["e1_0"] },
//!         "s": [ { "queue_detectors": ["e2_1"] } ]
//!       } }
//!     }
//!   }
//! }
//! ```

use super::{read_file, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A flat, described list of detector ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorList {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detector_ids: Vec<String>,
}

/// Detectors covering the lanes served by one phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseDetectors {
    /// Lane-area detectors measuring the queue
    #[serde(default)]
    pub queue_detectors: Vec<String>,
    /// Induction loops on the same lanes
    #[serde(default, rename = "queue2_detector")]
    pub flow_detectors: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseDetectorGroups {
    #[serde(default)]
    pub p: Option<PhaseDetectors>,
    #[serde(default)]
    pub s: Vec<PhaseDetectors>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionDetectorEntry {
    #[serde(default)]
    pub phases: PhaseDetectorGroups,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverDetectors {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub intersections: BTreeMap<String, IntersectionDetectorEntry>,
}

/// Queue detectors of one monitored intersection, flattened for sampling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntersectionDetectors {
    pub primary: Vec<String>,
    /// One detector group per secondary phase, in phase order
    pub secondary: Vec<Vec<String>>,
}

/// The detector grouping document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub metadata: Option<DetectorMetadata>,
    #[serde(default)]
    pub algorithm_input_detectors: DetectorList,
    #[serde(default)]
    pub mfd_input_flow_detectors: DetectorList,
    #[serde(default)]
    pub solver_input_detectors: SolverDetectors,
}

impl DetectorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read_file(path.as_ref())?)
    }

    /// Detectors whose summed accumulation estimates the protected region
    pub fn network_detectors(&self) -> &[String] {
        &self.algorithm_input_detectors.detector_ids
    }

    /// Flow detectors feeding the macroscopic fundamental diagram input
    pub fn flow_detectors(&self) -> &[String] {
        &self.mfd_input_flow_detectors.detector_ids
    }

    /// Queue detector groups for every monitored intersection
    pub fn intersection_detectors(&self) -> BTreeMap<String, IntersectionDetectors> {
        self.solver_input_detectors
            .intersections
            .iter()
            .map(|(id, entry)| {
                let primary = entry
                    .phases
                    .p
                    .as_ref()
                    .map(|p| p.queue_detectors.clone())
                    .unwrap_or_default();
                let secondary = entry
                    .phases
                    .s
                    .iter()
                    .map(|s| s.queue_detectors.clone())
                    .collect();
                (id.clone(), IntersectionDetectors { primary, secondary })
            })
            .collect()
    }

    pub fn num_monitored_intersections(&self) -> usize {
        self.solver_input_detectors.intersections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_primary_group_yields_empty_detector_list() {
        let config = DetectorConfig::from_json_str(
            r#"{"solver_input_detectors": {"intersections": {"J1": {"phases": {"s": [{"queue_detectors": ["a"]}]}}}}}"#,
        )
        .unwrap();

        let groups = config.intersection_detectors();
        assert!(groups["J1"].primary.is_empty());
        assert_eq!(groups["J1"].secondary, vec![vec!["a".to_string()]]);
        assert!(config.network_detectors().is_empty());
    }
}
