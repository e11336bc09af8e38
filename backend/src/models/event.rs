//! Event logging for run replay and analysis.
//!
//! Every significant pipeline action is recorded as an `Event` stamped with
//! the simulated time it happened at. The log enables:
//! - Debugging (which plan landed on which intersection, and when)
//! - Analysis (the accumulation trace n(k) over the run)
//! - Auditing (every scheduled plan is either applied, discarded or still pending)
//!
//! # Event Types
//!
//! - **Sampled**: detectors were read at a sampling boundary
//! - **Aggregated**: buffers were reduced to means
//! - **ControlStep** / **ControllerFailed**: the controller ran
//! - **PlanScheduled**: a plan entered the pending store
//! - **PlanApplied** / **PlanDiscarded** / **ActuationSkipped**: actuation outcomes
//!
//! # Example
//!
//! ```rust
//! use perimeter_control_core_rs::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::Aggregated { time: 50.0, accumulation: 120.5, samples: 5 });
//! assert_eq!(log.accumulation_series(), vec![(50.0, 120.5)]);
//! ```

use crate::models::plan::GreenTimePlan;

/// Pipeline event capturing one action.
///
/// Events are logged in the order they occur within a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Detectors were sampled
    Sampled {
        time: f64,
        /// Network-wide accumulation reading appended to the buffer
        accumulation: f64,
        /// Readings in this sample that degraded to the default
        degraded_readings: usize,
    },

    /// Sample buffers were reduced to means and cleared
    Aggregated {
        time: f64,
        accumulation: f64,
        /// Network samples consumed by this aggregation
        samples: usize,
    },

    /// Controller produced a new carried gate-flow state
    ControlStep {
        time: f64,
        accumulation: f64,
        previous_accumulation: f64,
        gate_flow: f64,
    },

    /// Controller call failed; carried state left unchanged
    ControllerFailed { time: f64, reason: String },

    /// Plan placed in the pending store
    PlanScheduled {
        time: f64,
        intersection_id: String,
        plan: GreenTimePlan,
        /// An unconsumed plan for the same intersection was overwritten
        replaced: bool,
    },

    /// Plan written to the simulator at a cycle boundary
    PlanApplied {
        time: f64,
        intersection_id: String,
        traffic_light_id: String,
        plan: GreenTimePlan,
    },

    /// Plan removed without being applied
    PlanDiscarded {
        time: f64,
        intersection_id: String,
        reason: String,
    },

    /// Pending plan could not be evaluated this step and stays pending
    ActuationSkipped {
        time: f64,
        intersection_id: String,
        reason: String,
    },
}

impl Event {
    /// Simulated time the event happened at
    pub fn time(&self) -> f64 {
        match self {
            Event::Sampled { time, .. }
            | Event::Aggregated { time, .. }
            | Event::ControlStep { time, .. }
            | Event::ControllerFailed { time, .. }
            | Event::PlanScheduled { time, .. }
            | Event::PlanApplied { time, .. }
            | Event::PlanDiscarded { time, .. }
            | Event::ActuationSkipped { time, .. } => *time,
        }
    }

    /// Event type name (for filtering)
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Sampled { .. } => "Sampled",
            Event::Aggregated { .. } => "Aggregated",
            Event::ControlStep { .. } => "ControlStep",
            Event::ControllerFailed { .. } => "ControllerFailed",
            Event::PlanScheduled { .. } => "PlanScheduled",
            Event::PlanApplied { .. } => "PlanApplied",
            Event::PlanDiscarded { .. } => "PlanDiscarded",
            Event::ActuationSkipped { .. } => "ActuationSkipped",
        }
    }

    /// Intersection the event concerns, if any
    pub fn intersection_id(&self) -> Option<&str> {
        match self {
            Event::PlanScheduled { intersection_id, .. }
            | Event::PlanApplied { intersection_id, .. }
            | Event::PlanDiscarded { intersection_id, .. }
            | Event::ActuationSkipped { intersection_id, .. } => Some(intersection_id),
            _ => None,
        }
    }
}

/// Event log for storing and querying pipeline events.
///
/// This is a simple wrapper around Vec<Event> with convenience methods.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events for a specific intersection
    pub fn events_for_intersection(&self, intersection_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.intersection_id() == Some(intersection_id))
            .collect()
    }

    /// The (time, n(k)) trace produced by every aggregation so far
    pub fn accumulation_series(&self) -> Vec<(f64, f64)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Aggregated {
                    time, accumulation, ..
                } => Some((*time, *accumulation)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_time_and_type() {
        let event = Event::PlanApplied {
            time: 120.0,
            intersection_id: "J1".to_string(),
            traffic_light_id: "TL1".to_string(),
            plan: GreenTimePlan::new(30.0, vec![12.0]),
        };
        assert_eq!(event.time(), 120.0);
        assert_eq!(event.event_type(), "PlanApplied");
        assert_eq!(event.intersection_id(), Some("J1"));
    }

    #[test]
    fn test_events_for_intersection_filters_other_ids() {
        let mut log = EventLog::new();
        log.log(Event::PlanDiscarded {
            time: 1.0,
            intersection_id: "J1".to_string(),
            reason: "gone".to_string(),
        });
        log.log(Event::ActuationSkipped {
            time: 1.0,
            intersection_id: "J2".to_string(),
            reason: "no topology".to_string(),
        });
        log.log(Event::Aggregated {
            time: 50.0,
            accumulation: 3.0,
            samples: 5,
        });

        assert_eq!(log.events_for_intersection("J1").len(), 1);
        assert_eq!(log.events_of_type("Aggregated").len(), 1);
        assert_eq!(log.len(), 3);
    }
}
