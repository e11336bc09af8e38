//! Green-time plans and the phase layout they are applied to

use serde::{Deserialize, Serialize};

/// Target green durations for one intersection
///
/// Produced once per control tick by the controller and immutable once
/// published. The serialized shape matches the controller hand-off:
/// `{"p": 30.0, "s": [12.0, 18.0]}`.
///
/// # Example
/// ```
/// use perimeter_control_core_rs::GreenTimePlan;
///
/// let plan: GreenTimePlan = serde_json::from_str(r#"{"p": 30, "s": [12]}"#).unwrap();
/// assert_eq!(plan.primary, 30.0);
/// assert_eq!(plan.secondary, vec![12.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenTimePlan {
    /// Duration (seconds) for every primary phase
    #[serde(rename = "p")]
    pub primary: f64,

    /// Durations (seconds) for secondary phase groups, by position
    #[serde(rename = "s", default)]
    pub secondary: Vec<f64>,
}

impl GreenTimePlan {
    pub fn new(primary: f64, secondary: Vec<f64>) -> Self {
        Self { primary, secondary }
    }
}

/// Which signal phases of an intersection receive which plan durations
///
/// `primary` lists every phase index that gets the plan's primary duration.
/// `secondary[i]` is the phase index that gets `plan.secondary[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub primary: Vec<usize>,
    pub secondary: Vec<usize>,
}

impl PhaseInfo {
    pub fn new(primary: Vec<usize>, secondary: Vec<usize>) -> Self {
        Self { primary, secondary }
    }
}
