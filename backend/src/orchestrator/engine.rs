//! Orchestrator Engine
//!
//! Main stepping loop integrating all pipeline components:
//! - Detector sampling (sampling cadence)
//! - Aggregation into control-grade measurements (aggregation cadence)
//! - Controller invocation and plan scheduling (control cadence)
//! - Cycle-synchronized actuation (every step)
//!
//! # Architecture
//!
//! ```text
//! start():
//!   read step length, advance one step, seed n(previous) from one reading
//!
//! For each step:
//! 1. Advance the simulator and read the current time
//! 2. Sampling boundary?     -> append detector readings to the buffers
//! 3. Aggregation boundary?  -> reduce buffers to means, clear them
//! 4. Control boundary?      -> run controller, move plans into the pending store
//! 5. Always                 -> apply pending plans whose intersection is at a cycle boundary
//! ```
//!
//! The order is fixed, so a plan scheduled in step 4 is never applied in the
//! same step. The orchestrator is the only caller that touches the simulator.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut orchestrator = Orchestrator::new(
//!     simulator, controller, channel, topology, &detectors, PipelineConfig::default(),
//! )?;
//! let summary = orchestrator.run();
//! println!("{} steps, stopped: {}", summary.steps, summary.stop_reason);
//! ```

use crate::actuation::{ActuationOutcome, CycleSyncActuator, PendingPlanStore};
use crate::aggregation::SampleBuffers;
use crate::config::{DetectorConfig, IntersectionDetectors, TopologyProvider};
use crate::control::{Controller, ControllerAdapter, PlanChannel};
use crate::core::time::CadenceTimer;
use crate::models::event::{Event, EventLog};
use crate::models::measurement::AggregatedMeasurement;
use crate::sensing::{DetectorSampler, OccupancyModel};
use crate::simulator::{Simulator, SimulatorError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

// ============================================================================
// Configuration Types
// ============================================================================

/// Cadences and limits of one run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Seconds between detector samples
    pub sampling_interval_s: f64,

    /// Seconds between aggregation events
    pub aggregation_interval_s: f64,

    /// Seconds between controller invocations
    pub control_interval_s: f64,

    /// Stop once simulated time reaches this value
    pub total_simulation_time_s: f64,

    /// Seconds between progress log lines
    pub progress_log_interval_s: f64,

    /// Geometry for occupancy to vehicle conversion
    pub occupancy_model: OccupancyModel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_interval_s: 10.0,
            aggregation_interval_s: 50.0,
            control_interval_s: 90.0,
            total_simulation_time_s: 3600.0,
            progress_log_interval_s: 10.0,
            occupancy_model: OccupancyModel::default(),
        }
    }
}

/// Pipeline error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Pipeline not started")]
    NotStarted,

    #[error(transparent)]
    Simulator(#[from] SimulatorError),
}

/// Result of a single step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    /// Simulated time after the step
    pub time: f64,
    pub sampled: bool,
    pub aggregated: bool,
    pub controlled: bool,
    /// Plans moved into the pending store this step
    pub scheduled: usize,
    /// Plans written to the simulator this step
    pub applied: usize,
    /// Plans dropped because their intersection no longer exists
    pub discarded: usize,
    /// Plans still pending after the step
    pub pending: usize,
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    NoVehiclesRemaining,
    TimeBudgetExhausted,
    ConnectionClosed(String),
    /// The simulator failed in a way the loop cannot step past
    Fault(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NoVehiclesRemaining => write!(f, "no vehicles remaining"),
            StopReason::TimeBudgetExhausted => write!(f, "time budget exhausted"),
            StopReason::ConnectionClosed(msg) => write!(f, "connection closed: {}", msg),
            StopReason::Fault(msg) => write!(f, "simulator fault: {}", msg),
        }
    }
}

/// Summary reported after shutdown
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Simulator steps executed, including the initial one
    pub steps: usize,
    pub final_time: f64,
    pub stop_reason: StopReason,
    pub plans_applied: usize,
    /// Plans still waiting for a cycle boundary at shutdown
    pub pending_plans: usize,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Main driver owning the simulator connection and the pipeline state
///
/// Generic over the simulator, the controller, and the topology provider so
/// a live connection and a scripted test double run the same code.
pub struct Orchestrator<S, C, T> {
    sim: S,
    controller: C,
    topology: T,

    config: PipelineConfig,

    /// Network-wide accumulation detectors
    network_detectors: Vec<String>,

    /// Queue detectors per monitored intersection
    queue_detectors: BTreeMap<String, IntersectionDetectors>,

    sampler: DetectorSampler,
    buffers: SampleBuffers,
    measurement: AggregatedMeasurement,
    adapter: ControllerAdapter,
    store: PendingPlanStore,

    /// Built on `start()` once the step length is known
    actuator: Option<CycleSyncActuator>,

    sampling_timer: CadenceTimer,
    aggregation_timer: CadenceTimer,
    control_timer: CadenceTimer,
    progress_timer: CadenceTimer,

    steps: usize,
    current_time: f64,
    plans_applied: usize,

    event_log: EventLog,
}

impl<S, C, T> Orchestrator<S, C, T>
where
    S: Simulator,
    C: Controller,
    T: TopologyProvider,
{
    /// Create a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `sim` - Simulator connection (already launched)
    /// * `controller` - Feedback controller
    /// * `channel` - Channel the controller publishes plans into
    /// * `topology` - Intersection topology lookups
    /// * `detectors` - Detector grouping document
    /// * `config` - Cadences and limits
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to `start()` or `run()`
    /// * `Err(PipelineError::InvalidConfig)` - A cadence is not positive
    pub fn new(
        sim: S,
        controller: C,
        channel: PlanChannel,
        topology: T,
        detectors: &DetectorConfig,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        Self::validate_config(&config)?;

        let queue_detectors = detectors.intersection_detectors();
        let buffers = SampleBuffers::new(
            queue_detectors
                .iter()
                .map(|(id, groups)| (id.clone(), groups.secondary.len())),
        );

        info!(
            network_detectors = detectors.network_detectors().len(),
            monitored_intersections = queue_detectors.len(),
            flow_detectors = detectors.flow_detectors().len(),
            "pipeline configured"
        );

        Ok(Self {
            sim,
            controller,
            topology,
            network_detectors: detectors.network_detectors().to_vec(),
            queue_detectors,
            sampler: DetectorSampler::new(config.occupancy_model),
            buffers,
            measurement: AggregatedMeasurement::default(),
            adapter: ControllerAdapter::new(channel, 0.0),
            store: PendingPlanStore::new(),
            actuator: None,
            sampling_timer: CadenceTimer::new(
                config.sampling_interval_s,
                config.sampling_interval_s,
            ),
            aggregation_timer: CadenceTimer::new(
                config.aggregation_interval_s,
                config.aggregation_interval_s,
            ),
            control_timer: CadenceTimer::new(config.control_interval_s, config.control_interval_s),
            progress_timer: CadenceTimer::new(
                config.progress_log_interval_s,
                config.progress_log_interval_s,
            ),
            config,
            steps: 0,
            current_time: 0.0,
            plans_applied: 0,
            event_log: EventLog::new(),
        })
    }

    fn validate_config(config: &PipelineConfig) -> Result<(), PipelineError> {
        let intervals = [
            ("sampling_interval_s", config.sampling_interval_s),
            ("aggregation_interval_s", config.aggregation_interval_s),
            ("control_interval_s", config.control_interval_s),
            ("progress_log_interval_s", config.progress_log_interval_s),
        ];
        for (name, value) in intervals {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} must be > 0",
                    name
                )));
            }
        }
        if config.total_simulation_time_s.is_nan() || config.total_simulation_time_s <= 0.0 {
            return Err(PipelineError::InvalidConfig(
                "total_simulation_time_s must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Simulated time after the last step
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Simulator steps executed so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_started(&self) -> bool {
        self.actuator.is_some()
    }

    /// Latest aggregated measurement
    pub fn measurement(&self) -> &AggregatedMeasurement {
        &self.measurement
    }

    pub fn buffers(&self) -> &SampleBuffers {
        &self.buffers
    }

    pub fn pending_plans(&self) -> &PendingPlanStore {
        &self.store
    }

    pub fn adapter(&self) -> &ControllerAdapter {
        &self.adapter
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn simulator(&self) -> &S {
        &self.sim
    }

    /// Direct simulator access, bypassing the loop. Intended for tests.
    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    // ========================================================================
    // Tick Loop Implementation
    // ========================================================================

    /// Prepare the run
    ///
    /// Reads the step length, advances one step, and takes one network
    /// reading that seeds both the current and the previous accumulation.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        let step_length = self.sim.step_length()?;
        self.actuator = Some(CycleSyncActuator::new(step_length));

        self.sim.step()?;
        self.steps += 1;
        self.current_time = self.sim.time()?;

        let initial = self.sampler.sample(&mut self.sim, &self.network_detectors)?;
        self.adapter.seed_accumulation(initial.value());
        self.measurement.accumulation = initial.value();

        info!(
            step_length,
            initial_accumulation = initial.value(),
            "initialisation complete, entering main loop"
        );
        Ok(())
    }

    /// Execute one simulation step
    ///
    /// # Returns
    ///
    /// * `Ok(StepResult)` - Step executed
    /// * `Err(PipelineError::NotStarted)` - `start()` has not run
    /// * `Err(PipelineError::Simulator)` - The simulator failed to step, or the connection closed
    pub fn tick(&mut self) -> Result<StepResult, PipelineError> {
        if self.actuator.is_none() {
            return Err(PipelineError::NotStarted);
        }

        self.sim.step()?;
        self.steps += 1;
        let now = self.sim.time()?;
        self.current_time = now;

        let mut result = StepResult {
            time: now,
            ..Default::default()
        };

        // STEP 1: SAMPLING
        if self.sampling_timer.poll(now) {
            self.sample(now)?;
            result.sampled = true;
        }

        // STEP 2: AGGREGATION
        if self.aggregation_timer.poll(now) {
            self.aggregate(now);
            result.aggregated = true;
        }

        // STEP 3: CONTROL
        let mut scheduled_now = BTreeSet::new();
        if self.control_timer.poll(now) {
            scheduled_now = self.control(now);
            result.scheduled = scheduled_now.len();
            result.controlled = true;
        }

        // STEP 4: ACTUATION (every step; plans scheduled above wait for the next step)
        let (applied, discarded) = self.actuate(now, &scheduled_now)?;
        result.applied = applied;
        result.discarded = discarded;
        result.pending = self.store.len();

        if self.progress_timer.poll(now) {
            info!(
                time = now,
                total = self.config.total_simulation_time_s,
                pending_plans = result.pending,
                "simulation progress"
            );
        }

        Ok(result)
    }

    /// Run until no vehicles remain, the time budget is exhausted, or the
    /// simulator fails
    ///
    /// Always attempts to close the connection and reports the step count,
    /// whichever condition ended the loop.
    pub fn run(&mut self) -> RunSummary {
        let stop_reason = match self.run_loop() {
            Ok(reason) => reason,
            Err(PipelineError::Simulator(err)) if err.is_fatal() => {
                warn!(error = %err, "simulator connection closed, shutting down");
                StopReason::ConnectionClosed(err.to_string())
            }
            Err(err) => {
                warn!(error = %err, "simulation ended early");
                StopReason::Fault(err.to_string())
            }
        };

        info!("closing simulation");
        if let Err(err) = self.sim.close() {
            warn!(error = %err, "error while closing simulator");
        }
        info!(
            steps = self.steps,
            final_time = self.current_time,
            reason = %stop_reason,
            "simulation finished"
        );

        RunSummary {
            steps: self.steps,
            final_time: self.current_time,
            stop_reason,
            plans_applied: self.plans_applied,
            pending_plans: self.store.len(),
        }
    }

    fn run_loop(&mut self) -> Result<StopReason, PipelineError> {
        if !self.is_started() {
            self.start()?;
        }

        loop {
            if self.sim.min_expected_vehicles()? == 0 {
                info!(time = self.current_time, "no vehicles remaining, stopping");
                return Ok(StopReason::NoVehiclesRemaining);
            }

            self.tick()?;

            if self.current_time >= self.config.total_simulation_time_s {
                info!(time = self.current_time, "maximum simulation time reached, stopping");
                return Ok(StopReason::TimeBudgetExhausted);
            }
        }
    }

    // ========================================================================
    // Pipeline Stages
    // ========================================================================

    fn sample(&mut self, now: f64) -> Result<(), PipelineError> {
        let mut degraded = 0;

        let network = self.sampler.sample(&mut self.sim, &self.network_detectors)?;
        degraded += usize::from(network.is_degraded());
        self.buffers.push_network(network.value());

        for (intersection_id, groups) in &self.queue_detectors {
            let primary = self.sampler.sample(&mut self.sim, &groups.primary)?;
            degraded += usize::from(primary.is_degraded());
            self.buffers.push_primary(intersection_id, primary.value());

            for (group, detectors) in groups.secondary.iter().enumerate() {
                let reading = self.sampler.sample(&mut self.sim, detectors)?;
                degraded += usize::from(reading.is_degraded());
                self.buffers
                    .push_secondary(intersection_id, group, reading.value());
            }
        }

        self.event_log.log(Event::Sampled {
            time: now,
            accumulation: network.value(),
            degraded_readings: degraded,
        });
        Ok(())
    }

    fn aggregate(&mut self, now: f64) {
        let (measurement, samples) = self.buffers.aggregate();
        info!(
            time = now,
            accumulation = measurement.accumulation,
            samples,
            "aggregated measurements, buffers cleared"
        );
        self.event_log.log(Event::Aggregated {
            time: now,
            accumulation: measurement.accumulation,
            samples,
        });
        self.measurement = measurement;
    }

    /// Returns the ids of the plans scheduled
    fn control(&mut self, now: f64) -> BTreeSet<String> {
        info!(time = now, "running controller");
        match self
            .adapter
            .run(&mut self.controller, &self.measurement, &mut self.store)
        {
            Ok(tick) => {
                self.event_log.log(Event::ControlStep {
                    time: now,
                    accumulation: tick.accumulation,
                    previous_accumulation: tick.previous_accumulation,
                    gate_flow: tick.gate_flow,
                });
                let mut scheduled = BTreeSet::new();
                for plan in tick.scheduled {
                    scheduled.insert(plan.intersection_id.clone());
                    self.event_log.log(Event::PlanScheduled {
                        time: now,
                        intersection_id: plan.intersection_id,
                        plan: plan.plan,
                        replaced: plan.replaced,
                    });
                }
                scheduled
            }
            Err(err) => {
                error!(time = now, error = %err, "controller step failed, keeping previous state");
                self.event_log.log(Event::ControllerFailed {
                    time: now,
                    reason: err.to_string(),
                });
                BTreeSet::new()
            }
        }
    }

    /// Returns (applied, discarded)
    fn actuate(
        &mut self,
        now: f64,
        held_back: &BTreeSet<String>,
    ) -> Result<(usize, usize), PipelineError> {
        let Some(actuator) = &mut self.actuator else {
            return Err(PipelineError::NotStarted);
        };
        if self.store.is_empty() {
            return Ok((0, 0));
        }

        let outcomes = actuator.actuate_except(
            &mut self.sim,
            &self.topology,
            &mut self.store,
            now,
            held_back,
        )?;

        let (mut applied, mut discarded) = (0, 0);
        for (intersection_id, outcome) in outcomes {
            match outcome {
                ActuationOutcome::Waiting | ActuationOutcome::StillSkipped(_) => {}
                ActuationOutcome::Applied {
                    traffic_light_id,
                    plan,
                    ..
                } => {
                    applied += 1;
                    self.event_log.log(Event::PlanApplied {
                        time: now,
                        intersection_id,
                        traffic_light_id,
                        plan,
                    });
                }
                ActuationOutcome::Discarded { reason } => {
                    discarded += 1;
                    self.event_log.log(Event::PlanDiscarded {
                        time: now,
                        intersection_id,
                        reason,
                    });
                }
                ActuationOutcome::Skipped(reason) => {
                    self.event_log.log(Event::ActuationSkipped {
                        time: now,
                        intersection_id,
                        reason: reason.to_string(),
                    });
                }
            }
        }
        self.plans_applied += applied;
        Ok((applied, discarded))
    }
}
