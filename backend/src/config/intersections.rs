//! Intersection topology document
//!
//! Maps intersection ids to traffic lights, records each traffic light's
//! phase list, and carries the optimization parameters the controller uses.
//! The actuator reads it through `TopologyProvider`.

use super::{read_file, ConfigError, TopologyProvider};
use crate::config::detectors::DetectorConfig;
use crate::models::plan::PhaseInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionMetadata {
    #[serde(default)]
    pub network_file: Option<String>,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub total_intersections: Option<usize>,
    #[serde(default)]
    pub total_traffic_lights: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub duration: f64,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLightConfig {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub phases: Vec<PhaseDefinition>,
    #[serde(default)]
    pub total_cycle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub traffic_light_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

/// Phase indices of one phase group plus its solver parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseGroup {
    #[serde(default)]
    pub phase_indices: Vec<usize>,
    #[serde(default)]
    pub saturation_flow: Option<f64>,
    #[serde(default)]
    pub turn_in_ratio: Option<f64>,
    #[serde(default)]
    pub queue_length: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseGroups {
    #[serde(default)]
    pub p: Option<PhaseGroup>,
    #[serde(default)]
    pub s: Vec<PhaseGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionData {
    #[serde(default)]
    pub cycle_length: Option<f64>,
    #[serde(default)]
    pub phases: PhaseGroups,
}

impl IntersectionData {
    /// Primary indices, plus the first index of every non-empty secondary group
    pub fn phase_info(&self) -> PhaseInfo {
        let primary = self
            .phases
            .p
            .as_ref()
            .map(|p| p.phase_indices.clone())
            .unwrap_or_default();
        let secondary = self
            .phases
            .s
            .iter()
            .filter_map(|group| group.phase_indices.first().copied())
            .collect();
        PhaseInfo::new(primary, secondary)
    }
}

/// Default parameters of the green-time optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationParameters {
    #[serde(default)]
    pub intersection_ids: Vec<String>,
    #[serde(default = "default_theta")]
    pub theta_1: f64,
    #[serde(default = "default_theta")]
    pub theta_2: f64,
    #[serde(default = "default_cycle_length")]
    pub default_cycle_length: f64,
    #[serde(default = "default_min_green")]
    pub min_green_time: f64,
    #[serde(default = "default_max_green")]
    pub max_green_time: f64,
    /// Largest allowed change of a green time between two plans (seconds)
    #[serde(default = "default_max_change")]
    pub max_change: f64,
    #[serde(default)]
    pub intersection_data: BTreeMap<String, IntersectionData>,
}

fn default_theta() -> f64 {
    1.0
}
fn default_cycle_length() -> f64 {
    90.0
}
fn default_min_green() -> f64 {
    15.0
}
fn default_max_green() -> f64 {
    75.0
}
fn default_max_change() -> f64 {
    10.0
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self {
            intersection_ids: Vec::new(),
            theta_1: default_theta(),
            theta_2: default_theta(),
            default_cycle_length: default_cycle_length(),
            min_green_time: default_min_green(),
            max_green_time: default_max_green(),
            max_change: default_max_change(),
            intersection_data: BTreeMap::new(),
        }
    }
}

/// Problems found when cross-checking the topology against the detector grouping
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigIssue {
    /// Intersection is monitored but has no traffic light mapping
    MissingTrafficLight { intersection_id: String },
    /// Intersection is monitored but has no phase layout
    MissingPhaseInfo { intersection_id: String },
    /// A phase index points past the end of the traffic light's phase list
    PhaseIndexOutOfRange {
        intersection_id: String,
        phase_index: usize,
        phase_count: usize,
    },
    /// Detector groups and phase groups disagree on the number of secondary phases
    SecondaryGroupMismatch {
        intersection_id: String,
        detector_groups: usize,
        phase_groups: usize,
    },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::MissingTrafficLight { intersection_id } => {
                write!(f, "{}: no traffic light mapping", intersection_id)
            }
            ConfigIssue::MissingPhaseInfo { intersection_id } => {
                write!(f, "{}: no phase layout", intersection_id)
            }
            ConfigIssue::PhaseIndexOutOfRange {
                intersection_id,
                phase_index,
                phase_count,
            } => write!(
                f,
                "{}: phase index {} out of range (traffic light has {} phases)",
                intersection_id, phase_index, phase_count
            ),
            ConfigIssue::SecondaryGroupMismatch {
                intersection_id,
                detector_groups,
                phase_groups,
            } => write!(
                f,
                "{}: {} secondary detector groups but {} secondary phase groups",
                intersection_id, detector_groups, phase_groups
            ),
        }
    }
}

/// The intersection topology document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntersectionConfig {
    #[serde(default)]
    pub metadata: Option<IntersectionMetadata>,
    #[serde(default)]
    pub traffic_lights: BTreeMap<String, TrafficLightConfig>,
    #[serde(default)]
    pub intersections: BTreeMap<String, IntersectionEntry>,
    #[serde(default)]
    pub optimization_parameters: OptimizationParameters,
}

impl IntersectionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read_file(path.as_ref())?)
    }

    pub fn intersection_data(&self, intersection_id: &str) -> Option<&IntersectionData> {
        self.optimization_parameters
            .intersection_data
            .get(intersection_id)
    }

    /// Cycle length for an intersection, falling back to the default
    pub fn cycle_length(&self, intersection_id: &str) -> f64 {
        self.intersection_data(intersection_id)
            .and_then(|d| d.cycle_length)
            .unwrap_or(self.optimization_parameters.default_cycle_length)
    }

    /// Cross-check against the detector grouping
    ///
    /// Every monitored intersection must resolve to a traffic light and a
    /// phase layout, and its phase indices must exist on that traffic light.
    pub fn validate_against(&self, detectors: &DetectorConfig) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        for (id, groups) in detectors.intersection_detectors() {
            let tl_id = self.traffic_light_id(&id);
            if tl_id.is_none() {
                issues.push(ConfigIssue::MissingTrafficLight {
                    intersection_id: id.clone(),
                });
            }
            let Some(phase_info) = self.phase_info(&id) else {
                issues.push(ConfigIssue::MissingPhaseInfo {
                    intersection_id: id.clone(),
                });
                continue;
            };

            if groups.secondary.len() != phase_info.secondary.len() {
                issues.push(ConfigIssue::SecondaryGroupMismatch {
                    intersection_id: id.clone(),
                    detector_groups: groups.secondary.len(),
                    phase_groups: phase_info.secondary.len(),
                });
            }

            let phase_count = tl_id
                .as_deref()
                .and_then(|tl| self.traffic_lights.get(tl))
                .map(|tl| tl.phases.len());
            if let Some(phase_count) = phase_count {
                for &phase_index in phase_info.primary.iter().chain(&phase_info.secondary) {
                    if phase_index >= phase_count {
                        issues.push(ConfigIssue::PhaseIndexOutOfRange {
                            intersection_id: id.clone(),
                            phase_index,
                            phase_count,
                        });
                    }
                }
            }
        }
        issues
    }
}

impl TopologyProvider for IntersectionConfig {
    /// The explicit mapping wins; an intersection named after a known
    /// traffic light resolves to it.
    fn traffic_light_id(&self, intersection_id: &str) -> Option<String> {
        if let Some(entry) = self.intersections.get(intersection_id) {
            if let Some(tl_id) = &entry.traffic_light_id {
                return Some(tl_id.clone());
            }
        }
        self.traffic_lights
            .contains_key(intersection_id)
            .then(|| intersection_id.to_string())
    }

    fn phase_info(&self, intersection_id: &str) -> Option<PhaseInfo> {
        self.intersection_data(intersection_id).map(IntersectionData::phase_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_secondary_groups_are_skipped() {
        let data: IntersectionData = serde_json::from_str(
            r#"{"phases": {"p": {"phase_indices": [0, 4]}, "s": [{"phase_indices": []}, {"phase_indices": [2, 3]}]}}"#,
        )
        .unwrap();

        let info = data.phase_info();
        assert_eq!(info.primary, vec![0, 4]);
        assert_eq!(info.secondary, vec![2]);
    }

    #[test]
    fn test_cycle_length_falls_back_to_default() {
        let config = IntersectionConfig::default();
        assert_eq!(config.cycle_length("J1"), 90.0);
    }
}
