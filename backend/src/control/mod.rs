//! Controller interface and adapter
//!
//! The feedback control law is an external collaborator. Each control tick
//! the pipeline hands it the latest aggregated measurements and the state it
//! returned last time; the controller answers with a new carried gate-flow
//! scalar and publishes green-time plans into a `PlanChannel` it was built
//! with.
//!
//! # Controller Interface
//!
//! ```rust
//! use perimeter_control_core_rs::control::{ControlError, ControlInput, ControlOutput, Controller};
//! use perimeter_control_core_rs::{GreenTimePlan, PlanChannel};
//!
//! struct FixedPlan {
//!     channel: PlanChannel,
//! }
//!
//! impl Controller for FixedPlan {
//!     fn step(&mut self, input: &ControlInput<'_>) -> Result<ControlOutput, ControlError> {
//!         for id in input.queues.keys() {
//!             self.channel.publish(id.clone(), GreenTimePlan::new(30.0, vec![]));
//!         }
//!         self.channel.set_active(true);
//!         Ok(ControlOutput { gate_flow: input.previous_gate_flow })
//!     }
//! }
//! ```

pub mod channel;

pub use channel::PlanChannel;

use crate::actuation::store::PendingPlanStore;
use crate::models::measurement::{AggregatedMeasurement, QueueMeasurement};
use crate::models::plan::GreenTimePlan;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by a controller implementation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControlError {
    #[error("Controller failed: {0}")]
    Failed(String),

    #[error("Invalid controller output: {0}")]
    InvalidOutput(String),
}

/// Everything the controller sees on one control tick
#[derive(Debug, Clone)]
pub struct ControlInput<'a> {
    /// Current aggregated network accumulation n(k)
    pub current_accumulation: f64,
    /// Network accumulation at the previous control tick
    pub previous_accumulation: f64,
    /// Gate-flow state the controller returned on the previous tick
    pub previous_gate_flow: f64,
    /// Aggregated queue means per intersection
    pub queues: &'a BTreeMap<String, QueueMeasurement>,
}

/// Controller answer for one control tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    /// Gate-flow state carried to the next tick
    pub gate_flow: f64,
}

/// Feedback controller
pub trait Controller {
    /// Compute one control step
    ///
    /// Plans are not returned; they are published into the controller's
    /// `PlanChannel`.
    fn step(&mut self, input: &ControlInput<'_>) -> Result<ControlOutput, ControlError>;
}

impl<C: Controller + ?Sized> Controller for Box<C> {
    fn step(&mut self, input: &ControlInput<'_>) -> Result<ControlOutput, ControlError> {
        (**self).step(input)
    }
}

/// One plan moved from the channel into the pending store
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledPlan {
    pub intersection_id: String,
    pub plan: GreenTimePlan,
    /// An unconsumed plan for this intersection was overwritten
    pub replaced: bool,
}

/// Result of a successful control tick
#[derive(Debug, Clone, PartialEq)]
pub struct ControlTick {
    pub accumulation: f64,
    pub previous_accumulation: f64,
    pub gate_flow: f64,
    pub scheduled: Vec<ScheduledPlan>,
}

/// Carries controller state between ticks and moves plans into the store
#[derive(Debug, Clone)]
pub struct ControllerAdapter {
    channel: PlanChannel,
    previous_accumulation: f64,
    gate_flow: f64,
}

impl ControllerAdapter {
    /// Create an adapter draining `channel`
    ///
    /// # Arguments
    /// * `channel` - Channel the controller publishes into
    /// * `initial_accumulation` - Reading taken before the first control tick
    pub fn new(channel: PlanChannel, initial_accumulation: f64) -> Self {
        Self {
            channel,
            previous_accumulation: initial_accumulation,
            gate_flow: 0.0,
        }
    }

    pub fn channel(&self) -> &PlanChannel {
        &self.channel
    }

    pub fn previous_accumulation(&self) -> f64 {
        self.previous_accumulation
    }

    pub fn gate_flow(&self) -> f64 {
        self.gate_flow
    }

    /// Replace the accumulation used as "previous" on the next tick
    pub fn seed_accumulation(&mut self, accumulation: f64) {
        self.previous_accumulation = accumulation;
    }

    /// Run one control tick
    ///
    /// On success the carried state is updated and any newly published plans
    /// are moved into `store`. On failure the carried state is untouched and
    /// nothing is drained.
    pub fn run<C>(
        &mut self,
        controller: &mut C,
        measurement: &AggregatedMeasurement,
        store: &mut PendingPlanStore,
    ) -> Result<ControlTick, ControlError>
    where
        C: Controller + ?Sized,
    {
        let input = ControlInput {
            current_accumulation: measurement.accumulation,
            previous_accumulation: self.previous_accumulation,
            previous_gate_flow: self.gate_flow,
            queues: &measurement.queues,
        };
        let output = controller.step(&input)?;
        if !output.gate_flow.is_finite() {
            return Err(ControlError::InvalidOutput(format!(
                "gate flow must be finite, got {}",
                output.gate_flow
            )));
        }

        let tick = ControlTick {
            accumulation: measurement.accumulation,
            previous_accumulation: self.previous_accumulation,
            gate_flow: output.gate_flow,
            scheduled: self.schedule_pending(store),
        };

        self.gate_flow = output.gate_flow;
        self.previous_accumulation = measurement.accumulation;
        Ok(tick)
    }

    /// Move every plan waiting in the channel into the pending store
    ///
    /// Does nothing while the channel is inactive. Drained slots are cleared,
    /// so a plan is never scheduled twice.
    pub fn schedule_pending(&self, store: &mut PendingPlanStore) -> Vec<ScheduledPlan> {
        if !self.channel.is_active() {
            debug!("plan channel inactive, nothing to schedule");
            return Vec::new();
        }

        let drained = self.channel.drain();
        if drained.is_empty() {
            return Vec::new();
        }
        info!(
            intersections = ?drained.keys().collect::<Vec<_>>(),
            "scheduling plans for next cycle boundary"
        );

        drained
            .into_iter()
            .map(|(intersection_id, plan)| {
                let replaced = store.publish(intersection_id.clone(), plan.clone()).is_some();
                ScheduledPlan {
                    intersection_id,
                    plan,
                    replaced,
                }
            })
            .collect()
    }
}
