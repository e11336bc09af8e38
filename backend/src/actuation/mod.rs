//! Cycle-synchronized actuation
//!
//! A pending plan may only land between two cycles, never inside one, so a
//! phase drivers are already committed to is never truncated. Every step,
//! for every intersection with a pending plan, the actuator reads where the
//! intersection is within its cycle and fires only when:
//!
//! ```text
//! current_phase == phase_count - 1  &&  time_to_next_switch <= step_length
//! ```
//!
//! i.e. the light is in its final phase and wraps to phase 0 within this step.
//!
//! # Per-entry outcomes
//!
//! | Situation                               | Entry   | Outcome        |
//! |-----------------------------------------|---------|----------------|
//! | not at a cycle boundary                 | kept    | `Waiting`      |
//! | at boundary, program written            | removed | `Applied`      |
//! | traffic light unknown                   | kept    | `Skipped`      |
//! | at boundary, phase layout unknown       | kept    | `Skipped`      |
//! | running program not found               | kept    | `Skipped`      |
//! | simulator: entity does not exist        | removed | `Discarded`    |
//! | transient or unexpected simulator error | kept    | `Skipped`      |
//! | connection closed                       | kept    | error returned |
//!
//! One entry's failure never prevents evaluation of the others.
//!
//! Configuration skips (unknown traffic light, phase layout or program) are
//! retried every step but only reported when they start: on consecutive
//! steps with the same reason the outcome is `StillSkipped` and nothing is
//! logged.

pub mod store;

pub use store::PendingPlanStore;

use crate::config::TopologyProvider;
use crate::models::plan::{GreenTimePlan, PhaseInfo};
use crate::models::signal::{CycleState, SignalProgram};
use crate::simulator::{SimResult, Simulator, SimulatorError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{error, info, warn};

/// True iff the intersection wraps to a new cycle within one step
///
/// # Example
/// ```
/// use perimeter_control_core_rs::{actuation::is_cycle_boundary, CycleState};
///
/// let last = CycleState { phase_index: 6, phase_count: 7, time_to_next_switch: 1.0 };
/// let penultimate = CycleState { phase_index: 5, phase_count: 7, time_to_next_switch: 0.5 };
///
/// assert!(is_cycle_boundary(&last, 1.0));
/// assert!(!is_cycle_boundary(&penultimate, 1.0));
/// ```
pub fn is_cycle_boundary(state: &CycleState, step_length: f64) -> bool {
    state.is_last_phase() && state.time_to_next_switch <= step_length
}

/// Write plan durations into a program
///
/// Every primary phase index gets `plan.primary`; secondary index `i` gets
/// `plan.secondary[i]` while both lists have an entry. Indices past the end
/// of the program are ignored. Returns the number of phases written.
pub fn apply_plan(
    program: &mut SignalProgram,
    plan: &GreenTimePlan,
    phase_info: &PhaseInfo,
) -> usize {
    let mut written = 0;
    for &index in &phase_info.primary {
        if let Some(phase) = program.phases.get_mut(index) {
            phase.duration = plan.primary;
            written += 1;
        }
    }
    for (&index, &duration) in phase_info.secondary.iter().zip(&plan.secondary) {
        if let Some(phase) = program.phases.get_mut(index) {
            phase.duration = duration;
            written += 1;
        }
    }
    written
}

/// Why a pending plan was left in place this step
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    UnresolvedTrafficLight,
    MissingPhaseInfo,
    ProgramNotFound { traffic_light_id: String },
    Transient(String),
    Unexpected(String),
}

impl SkipReason {
    /// True for skips caused by configuration or program lookup, which
    /// persist until the topology or the simulator changes
    pub fn is_persistent(&self) -> bool {
        matches!(
            self,
            SkipReason::UnresolvedTrafficLight
                | SkipReason::MissingPhaseInfo
                | SkipReason::ProgramNotFound { .. }
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnresolvedTrafficLight => write!(f, "traffic light id not resolvable"),
            SkipReason::MissingPhaseInfo => write!(f, "phase layout missing"),
            SkipReason::ProgramNotFound { traffic_light_id } => {
                write!(f, "running program of {} not found", traffic_light_id)
            }
            SkipReason::Transient(msg) => write!(f, "transient simulator error: {}", msg),
            SkipReason::Unexpected(msg) => write!(f, "unexpected error: {}", msg),
        }
    }
}

/// What happened to one pending entry during a step
#[derive(Debug, Clone, PartialEq)]
pub enum ActuationOutcome {
    /// Not at a cycle boundary yet
    Waiting,
    /// Program rewritten and entry removed
    Applied {
        traffic_light_id: String,
        plan: GreenTimePlan,
        phases_written: usize,
    },
    /// Entry removed without applying
    Discarded { reason: String },
    /// Entry kept for a later step
    Skipped(SkipReason),
    /// Entry kept, skipped for the same persistent reason as last step
    StillSkipped(SkipReason),
}

/// Applies pending plans at cycle boundaries
#[derive(Debug, Clone)]
pub struct CycleSyncActuator {
    step_length: f64,
    /// Persistent skip last reported per pending intersection
    reported: BTreeMap<String, SkipReason>,
}

impl CycleSyncActuator {
    /// # Arguments
    /// * `step_length` - Duration of one simulation step (seconds)
    pub fn new(step_length: f64) -> Self {
        Self {
            step_length,
            reported: BTreeMap::new(),
        }
    }

    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    /// Evaluate every pending entry once
    ///
    /// # Arguments
    /// * `sim` - Simulator connection
    /// * `topology` - Intersection to traffic light / phase layout lookups
    /// * `store` - Pending plans; applied and stale entries are removed
    /// * `now` - Current simulated time
    ///
    /// # Returns
    ///
    /// * `Ok(outcomes)` - One outcome per entry evaluated, in id order
    /// * `Err(SimulatorError)` - The connection closed; remaining entries untouched
    pub fn actuate<S, T>(
        &mut self,
        sim: &mut S,
        topology: &T,
        store: &mut PendingPlanStore,
        now: f64,
    ) -> SimResult<Vec<(String, ActuationOutcome)>>
    where
        S: Simulator + ?Sized,
        T: TopologyProvider + ?Sized,
    {
        self.actuate_except(sim, topology, store, now, &BTreeSet::new())
    }

    /// Like `actuate`, but leaves the entries in `held_back` unevaluated
    ///
    /// The orchestrator holds back plans scheduled earlier in the same step.
    pub fn actuate_except<S, T>(
        &mut self,
        sim: &mut S,
        topology: &T,
        store: &mut PendingPlanStore,
        now: f64,
        held_back: &BTreeSet<String>,
    ) -> SimResult<Vec<(String, ActuationOutcome)>>
    where
        S: Simulator + ?Sized,
        T: TopologyProvider + ?Sized,
    {
        let mut outcomes = Vec::with_capacity(store.len());
        self.reported.retain(|id, _| store.contains(id));

        for intersection_id in store.intersection_ids() {
            if held_back.contains(&intersection_id) {
                continue;
            }
            let Some(plan) = store.get(&intersection_id).cloned() else {
                continue;
            };

            let outcome = match self.evaluate(sim, topology, &intersection_id, &plan, now) {
                Ok(outcome) => outcome,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) if err.is_unknown_entity() => {
                    warn!(intersection_id = %intersection_id, error = %err, "intersection no longer exists, discarding pending plan");
                    ActuationOutcome::Discarded {
                        reason: err.to_string(),
                    }
                }
                Err(SimulatorError::Transient(msg)) => {
                    error!(intersection_id = %intersection_id, error = %msg, "simulator error while checking cycle state");
                    ActuationOutcome::Skipped(SkipReason::Transient(msg))
                }
                Err(err) => {
                    error!(intersection_id = %intersection_id, error = ?err, "unexpected failure while applying pending plan");
                    ActuationOutcome::Skipped(SkipReason::Unexpected(err.to_string()))
                }
            };

            let outcome = self.track_skip(&intersection_id, outcome);
            if matches!(
                outcome,
                ActuationOutcome::Applied { .. } | ActuationOutcome::Discarded { .. }
            ) {
                store.remove(&intersection_id);
            }
            outcomes.push((intersection_id, outcome));
        }

        Ok(outcomes)
    }

    /// Collapse a repeated persistent skip into `StillSkipped`, warning only
    /// when an intersection starts being skipped or its reason changes
    fn track_skip(
        &mut self,
        intersection_id: &str,
        outcome: ActuationOutcome,
    ) -> ActuationOutcome {
        let reason = match outcome {
            ActuationOutcome::Skipped(reason) if reason.is_persistent() => reason,
            other => {
                self.reported.remove(intersection_id);
                return other;
            }
        };
        if self.reported.get(intersection_id) == Some(&reason) {
            return ActuationOutcome::StillSkipped(reason);
        }
        warn!(intersection_id = %intersection_id, reason = %reason, "pending plan cannot be applied, kept for retry");
        self.reported.insert(intersection_id.to_string(), reason.clone());
        ActuationOutcome::Skipped(reason)
    }

    fn evaluate<S, T>(
        &self,
        sim: &mut S,
        topology: &T,
        intersection_id: &str,
        plan: &GreenTimePlan,
        now: f64,
    ) -> SimResult<ActuationOutcome>
    where
        S: Simulator + ?Sized,
        T: TopologyProvider + ?Sized,
    {
        let Some(traffic_light_id) = topology.traffic_light_id(intersection_id) else {
            return Ok(ActuationOutcome::Skipped(SkipReason::UnresolvedTrafficLight));
        };

        let Some(mut program) = sim.active_program(&traffic_light_id)? else {
            return Ok(ActuationOutcome::Skipped(SkipReason::ProgramNotFound {
                traffic_light_id,
            }));
        };

        let state = CycleState {
            phase_index: sim.current_phase(&traffic_light_id)?,
            phase_count: program.phase_count(),
            time_to_next_switch: sim.next_switch(&traffic_light_id)? - now,
        };
        if !is_cycle_boundary(&state, self.step_length) {
            return Ok(ActuationOutcome::Waiting);
        }

        let Some(phase_info) = topology.phase_info(intersection_id) else {
            return Ok(ActuationOutcome::Skipped(SkipReason::MissingPhaseInfo));
        };

        let phases_written = apply_plan(&mut program, plan, &phase_info);
        sim.set_program(&traffic_light_id, &program)?;
        info!(
            intersection_id = %intersection_id,
            traffic_light_id = %traffic_light_id,
            primary = plan.primary,
            secondary = ?plan.secondary,
            "applied plan at cycle boundary"
        );

        Ok(ActuationOutcome::Applied {
            traffic_light_id,
            plan: plan.clone(),
            phases_written,
        })
    }
}
