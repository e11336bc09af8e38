//! Aggregated, control-grade measurements

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean queue lengths for one intersection over an aggregation window
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueMeasurement {
    #[serde(rename = "p")]
    pub primary: f64,
    /// One mean per secondary detector group, in group order
    #[serde(rename = "s")]
    pub secondary: Vec<f64>,
}

/// Output of one aggregation event
///
/// Valid until overwritten by the next aggregation event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedMeasurement {
    /// Network-wide mean accumulation n(k)
    pub accumulation: f64,

    /// Per-intersection queue means, keyed by intersection id
    pub queues: BTreeMap<String, QueueMeasurement>,
}

impl AggregatedMeasurement {
    pub fn queue(&self, intersection_id: &str) -> Option<&QueueMeasurement> {
        self.queues.get(intersection_id)
    }
}
