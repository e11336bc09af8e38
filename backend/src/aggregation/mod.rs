//! Sample buffers and the aggregator
//!
//! Samples accumulate at the sampling cadence and are reduced to means at
//! the aggregation cadence. `SampleBuffers::aggregate` takes every mean and
//! clears every buffer inside one `&mut self` call, so no sample can be
//! appended between reading a buffer and clearing it.

use crate::models::measurement::{AggregatedMeasurement, QueueMeasurement};
use std::collections::BTreeMap;

/// Arithmetic mean, 0 for an empty slice
///
/// # Example
/// ```
/// use perimeter_control_core_rs::aggregation::mean;
///
/// assert_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
/// assert_eq!(mean(&[]), 0.0);
/// ```
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[derive(Debug, Clone, Default)]
struct QueueBuffers {
    primary: Vec<f64>,
    secondary: Vec<Vec<f64>>,
}

/// Samples collected within the current, still-open aggregation window
///
/// One buffer holds the network-wide accumulation; each monitored
/// intersection owns a primary buffer and a fixed number of secondary
/// buffers (one per secondary detector group).
#[derive(Debug, Clone, Default)]
pub struct SampleBuffers {
    network: Vec<f64>,
    queues: BTreeMap<String, QueueBuffers>,
}

impl SampleBuffers {
    /// Create buffers for the given intersections
    ///
    /// # Arguments
    /// * `layout` - `(intersection_id, secondary_group_count)` pairs
    ///
    /// # Example
    /// ```
    /// use perimeter_control_core_rs::SampleBuffers;
    ///
    /// let buffers = SampleBuffers::new([("J1", 2), ("J2", 0)]);
    /// assert_eq!(buffers.num_intersections(), 2);
    /// assert_eq!(buffers.secondary_groups("J1"), Some(2));
    /// ```
    pub fn new<I, K>(layout: I) -> Self
    where
        I: IntoIterator<Item = (K, usize)>,
        K: Into<String>,
    {
        let queues = layout
            .into_iter()
            .map(|(id, groups)| {
                (
                    id.into(),
                    QueueBuffers {
                        primary: Vec::new(),
                        secondary: vec![Vec::new(); groups],
                    },
                )
            })
            .collect();
        Self {
            network: Vec::new(),
            queues,
        }
    }

    pub fn push_network(&mut self, value: f64) {
        self.network.push(value);
    }

    /// Append a primary queue sample; false if the intersection is not monitored
    pub fn push_primary(&mut self, intersection_id: &str, value: f64) -> bool {
        match self.queues.get_mut(intersection_id) {
            Some(buffers) => {
                buffers.primary.push(value);
                true
            }
            None => false,
        }
    }

    /// Append a secondary queue sample; false if there is no such buffer
    pub fn push_secondary(&mut self, intersection_id: &str, group: usize, value: f64) -> bool {
        match self
            .queues
            .get_mut(intersection_id)
            .and_then(|b| b.secondary.get_mut(group))
        {
            Some(buffer) => {
                buffer.push(value);
                true
            }
            None => false,
        }
    }

    pub fn network_len(&self) -> usize {
        self.network.len()
    }

    pub fn primary_len(&self, intersection_id: &str) -> Option<usize> {
        self.queues.get(intersection_id).map(|b| b.primary.len())
    }

    pub fn secondary_len(&self, intersection_id: &str, group: usize) -> Option<usize> {
        self.queues
            .get(intersection_id)
            .and_then(|b| b.secondary.get(group))
            .map(Vec::len)
    }

    pub fn secondary_groups(&self, intersection_id: &str) -> Option<usize> {
        self.queues.get(intersection_id).map(|b| b.secondary.len())
    }

    pub fn num_intersections(&self) -> usize {
        self.queues.len()
    }

    /// True when no buffer holds a sample
    pub fn is_empty(&self) -> bool {
        self.network.is_empty()
            && self
                .queues
                .values()
                .all(|b| b.primary.is_empty() && b.secondary.iter().all(Vec::is_empty))
    }

    /// Reduce every buffer to its mean, then clear every buffer
    ///
    /// Returns the measurement and the number of network samples it consumed.
    pub fn aggregate(&mut self) -> (AggregatedMeasurement, usize) {
        let samples = self.network.len();
        let accumulation = mean(&self.network);
        self.network.clear();

        let mut queues = BTreeMap::new();
        for (id, buffers) in self.queues.iter_mut() {
            let measurement = QueueMeasurement {
                primary: mean(&buffers.primary),
                secondary: buffers.secondary.iter().map(|s| mean(s)).collect(),
            };
            buffers.primary.clear();
            buffers.secondary.iter_mut().for_each(Vec::clear);
            queues.insert(id.clone(), measurement);
        }

        (
            AggregatedMeasurement {
                accumulation,
                queues,
            },
            samples,
        )
    }
}
