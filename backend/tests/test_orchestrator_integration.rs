//! Integration tests for the Orchestrator
//!
//! Runs the full stepping loop against the scripted simulator: multi-rate
//! cadences, controller hand-off, actuation and the termination conditions.

use perimeter_control_core_rs::models::event::Event;
use perimeter_control_core_rs::simulator::scripted::ScriptedSimulator;
use perimeter_control_core_rs::{
    ControlError, ControlInput, ControlOutput, Controller, DetectorConfig, GreenTimePlan,
    IntersectionConfig, Orchestrator, PipelineConfig, PipelineError, PlanChannel, SignalPhase,
    SignalProgram, StopReason,
};

// ============================================================================
// Fixtures
// ============================================================================

const DETECTORS: &str = r#"{
    "algorithm_input_detectors": {"detector_ids": ["n0", "n1"]},
    "mfd_input_flow_detectors": {"detector_ids": ["f0"]},
    "solver_input_detectors": {"intersections": {
        "J1": {"phases": {
            "p": {"queue_detectors": ["q1_p"]},
            "s": [{"queue_detectors": ["q1_s0"]}, {"queue_detectors": ["q1_s1"]}]
        }}
    }}
}"#;

const INTERSECTIONS: &str = r#"{
    "traffic_lights": {"TL_J1": {"type": "static", "phases": [], "total_cycle": 44}},
    "intersections": {"J1": {"traffic_light_id": "TL_J1"}},
    "optimization_parameters": {"intersection_data": {
        "J1": {"phases": {
            "p": {"phase_indices": [2]},
            "s": [{"phase_indices": [4]}, {"phase_indices": [5]}]
        }}
    }}
}"#;

/// Publishes a fixed plan (for J1 unless redirected) on every tick and
/// records its inputs
struct FixedPlan {
    channel: PlanChannel,
    intersection_id: &'static str,
    active: bool,
    inputs: Vec<(f64, f64, f64)>,
}

impl FixedPlan {
    fn new(channel: PlanChannel) -> Self {
        Self {
            channel,
            intersection_id: "J1",
            active: true,
            inputs: Vec::new(),
        }
    }

    fn for_intersection(mut self, intersection_id: &'static str) -> Self {
        self.intersection_id = intersection_id;
        self
    }
}

impl Controller for FixedPlan {
    fn step(&mut self, input: &ControlInput<'_>) -> Result<ControlOutput, ControlError> {
        self.inputs.push((
            input.current_accumulation,
            input.previous_accumulation,
            input.previous_gate_flow,
        ));
        self.channel
            .publish(self.intersection_id, GreenTimePlan::new(30.0, vec![12.0, 8.0]));
        self.channel.set_active(self.active);
        Ok(ControlOutput {
            gate_flow: input.previous_gate_flow + 1.0,
        })
    }
}

/// Fails on its first call, then behaves like `FixedPlan`
struct FlakyOnce {
    inner: FixedPlan,
    failed: bool,
}

impl Controller for FlakyOnce {
    fn step(&mut self, input: &ControlInput<'_>) -> Result<ControlOutput, ControlError> {
        if !self.failed {
            self.failed = true;
            return Err(ControlError::Failed("solver infeasible".to_string()));
        }
        self.inner.step(input)
    }
}

fn program() -> SignalProgram {
    SignalProgram::new(
        "0",
        [10.0, 3.0, 10.0, 3.0, 10.0, 3.0, 5.0]
            .iter()
            .map(|&d| SignalPhase::new(d, "GGrr"))
            .collect(),
    )
}

fn simulator() -> ScriptedSimulator {
    let mut sim = ScriptedSimulator::new(1.0);
    for id in ["n0", "n1", "q1_p", "q1_s0", "q1_s1"] {
        sim.set_occupancy(id, 30.0);
    }
    sim.add_traffic_light("TL_J1", program());
    sim
}

fn config(total: f64) -> PipelineConfig {
    PipelineConfig {
        sampling_interval_s: 10.0,
        aggregation_interval_s: 50.0,
        control_interval_s: 10.0,
        total_simulation_time_s: total,
        ..Default::default()
    }
}

fn build<C: Controller>(
    sim: ScriptedSimulator,
    controller: C,
    channel: PlanChannel,
    config: PipelineConfig,
) -> Orchestrator<ScriptedSimulator, C, IntersectionConfig> {
    let detectors = DetectorConfig::from_json_str(DETECTORS).unwrap();
    let topology = IntersectionConfig::from_json_str(INTERSECTIONS).unwrap();
    Orchestrator::new(sim, controller, channel, topology, &detectors, config).unwrap()
}

fn fixed(total: f64) -> Orchestrator<ScriptedSimulator, FixedPlan, IntersectionConfig> {
    let channel = PlanChannel::new();
    build(simulator(), FixedPlan::new(channel.clone()), channel, config(total))
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_non_positive_interval_is_rejected() {
    let detectors = DetectorConfig::from_json_str(DETECTORS).unwrap();
    let topology = IntersectionConfig::from_json_str(INTERSECTIONS).unwrap();
    let channel = PlanChannel::new();
    let bad = PipelineConfig {
        control_interval_s: 0.0,
        ..Default::default()
    };

    let result = Orchestrator::new(
        simulator(),
        FixedPlan::new(channel.clone()),
        channel,
        topology,
        &detectors,
        bad,
    );
    assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
}

// ============================================================================
// Multi-rate cadences
// ============================================================================

#[test]
fn test_five_samples_per_aggregation_window() {
    let mut orch = fixed(3600.0);
    orch.start().unwrap();
    assert_eq!(orch.current_time(), 1.0);

    while orch.current_time() < 49.0 {
        orch.tick().unwrap();
    }
    assert_eq!(orch.buffers().network_len(), 4);

    let result = orch.tick().unwrap();
    assert_eq!(result.time, 50.0);
    assert!(result.sampled);
    assert!(result.aggregated);

    let aggregated = orch.event_log().events_of_type("Aggregated");
    assert_eq!(aggregated.len(), 1);
    match aggregated[0] {
        Event::Aggregated { time, samples, .. } => {
            assert_eq!(*time, 50.0);
            assert_eq!(*samples, 5);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(orch.buffers().is_empty());
    assert_eq!(orch.buffers().primary_len("J1"), Some(0));
    assert_eq!(orch.buffers().secondary_len("J1", 1), Some(0));
}

#[test]
fn test_aggregated_queues_follow_detector_groups() {
    let mut orch = fixed(3600.0);
    orch.start().unwrap();
    while orch.current_time() < 50.0 {
        orch.tick().unwrap();
    }

    // Two network detectors at 30% each
    let per_detector = 80.0 * 30.0 / 300.0;
    let measurement = orch.measurement();
    assert!((measurement.accumulation - 2.0 * per_detector).abs() < 1e-9);

    let queue = measurement.queue("J1").unwrap();
    assert!((queue.primary - per_detector).abs() < 1e-9);
    assert_eq!(queue.secondary.len(), 2);
}

#[test]
fn test_cadence_counts_over_run() {
    let mut orch = fixed(100.0);
    let summary = orch.run();

    assert_eq!(summary.stop_reason, StopReason::TimeBudgetExhausted);
    let log = orch.event_log();
    assert_eq!(log.events_of_type("Sampled").len(), 10);
    assert_eq!(log.events_of_type("Aggregated").len(), 2);
    assert_eq!(log.events_of_type("ControlStep").len(), 10);
    assert_eq!(log.accumulation_series().len(), 2);
}

// ============================================================================
// Controller hand-off
// ============================================================================

#[test]
fn test_controller_state_is_carried_between_ticks() {
    let mut orch = fixed(30.0);
    orch.start().unwrap();
    let seed = orch.adapter().previous_accumulation();
    orch.run();

    let inputs = &orch.controller().inputs;
    assert_eq!(inputs.len(), 3);
    // First tick sees the initial reading and a zero gate flow
    assert_eq!(inputs[0].1, seed);
    assert_eq!(inputs[0].2, 0.0);
    // Later ticks see the previous tick's accumulation and gate flow
    assert_eq!(inputs[1].1, inputs[0].0);
    assert_eq!(inputs[1].2, 1.0);
    assert_eq!(inputs[2].2, 2.0);
}

#[test]
fn test_controller_failure_keeps_state_and_run_continues() {
    let channel = PlanChannel::new();
    let controller = FlakyOnce {
        inner: FixedPlan::new(channel.clone()),
        failed: false,
    };
    let mut orch = build(simulator(), controller, channel, config(25.0));
    orch.start().unwrap();
    let seed = orch.adapter().previous_accumulation();

    while orch.current_time() < 10.0 {
        orch.tick().unwrap();
    }
    assert_eq!(orch.event_log().events_of_type("ControllerFailed").len(), 1);
    assert_eq!(orch.adapter().previous_accumulation(), seed);
    assert_eq!(orch.adapter().gate_flow(), 0.0);
    assert!(orch.pending_plans().is_empty());

    let summary = orch.run();
    assert_eq!(summary.stop_reason, StopReason::TimeBudgetExhausted);
    let inputs = &orch.controller().inner.inputs;
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].1, seed);
}

#[test]
fn test_inactive_channel_schedules_nothing() {
    let channel = PlanChannel::new();
    let mut controller = FixedPlan::new(channel.clone());
    controller.active = false;
    let mut orch = build(simulator(), controller, channel.clone(), config(60.0));

    let summary = orch.run();
    assert_eq!(summary.plans_applied, 0);
    assert!(orch.event_log().events_of_type("PlanScheduled").is_empty());
    // Plans stay in the channel until it is activated
    assert_eq!(channel.len(), 1);
}

#[test]
fn test_plan_applied_at_cycle_boundary() {
    let mut orch = fixed(100.0);
    let summary = orch.run();

    assert!(summary.plans_applied >= 1);
    let applied = orch.event_log().events_of_type("PlanApplied");
    assert_eq!(applied.len(), summary.plans_applied);

    // Every write happened in the last phase of a cycle
    for write in orch.simulator().program_writes() {
        assert_eq!(write.traffic_light_id, "TL_J1");
        let durations: Vec<f64> = write.program.phases.iter().map(|p| p.duration).collect();
        assert_eq!(durations[2], 30.0);
        assert_eq!(durations[4], 12.0);
        assert_eq!(durations[5], 8.0);
    }
    assert_eq!(orch.simulator().program_writes().len(), summary.plans_applied);
}

#[test]
fn test_plan_for_removed_traffic_light_is_discarded() {
    let mut orch = fixed(3600.0);
    orch.start().unwrap();
    while orch.current_time() < 10.0 {
        orch.tick().unwrap();
    }
    assert!(orch.pending_plans().contains("J1"));

    orch.simulator_mut().remove_traffic_light("TL_J1");
    let result = orch.tick().unwrap();

    assert_eq!(result.discarded, 1);
    assert_eq!(result.pending, 0);
    assert_eq!(orch.event_log().events_for_intersection("J1").len(), 2);
    assert_eq!(orch.event_log().events_of_type("PlanDiscarded").len(), 1);
}

#[test]
fn test_unresolvable_plan_is_reported_once_over_long_run() {
    let channel = PlanChannel::new();
    let controller = FixedPlan::new(channel.clone()).for_intersection("J_missing");
    let mut orch = build(simulator(), controller, channel, config(5000.0));

    let summary = orch.run();

    assert_eq!(summary.stop_reason, StopReason::TimeBudgetExhausted);
    assert_eq!(summary.steps, 5000);
    assert_eq!(summary.pending_plans, 1);
    assert!(orch.pending_plans().contains("J_missing"));
    assert!(orch.simulator().program_writes().is_empty());
    assert_eq!(orch.event_log().events_of_type("ActuationSkipped").len(), 1);
}

// ============================================================================
// Degraded sensing
// ============================================================================

#[test]
fn test_failing_detector_degrades_to_zero_without_stopping() {
    let mut sim = simulator();
    sim.fail_detector("n1");
    let channel = PlanChannel::new();
    let mut orch = build(sim, FixedPlan::new(channel.clone()), channel, config(60.0));

    orch.start().unwrap();
    assert_eq!(orch.adapter().previous_accumulation(), 0.0);

    let summary = orch.run();
    assert_eq!(summary.stop_reason, StopReason::TimeBudgetExhausted);
    for event in orch.event_log().events_of_type("Sampled") {
        match event {
            Event::Sampled {
                accumulation,
                degraded_readings,
                ..
            } => {
                assert_eq!(*accumulation, 0.0);
                assert_eq!(*degraded_readings, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

// ============================================================================
// Termination
// ============================================================================

#[test]
fn test_stops_when_time_budget_exhausted() {
    let mut orch = fixed(60.0);
    let summary = orch.run();

    assert_eq!(summary.stop_reason, StopReason::TimeBudgetExhausted);
    assert_eq!(summary.final_time, 60.0);
    assert_eq!(summary.steps, 60);
    assert!(orch.simulator().is_closed());
}

#[test]
fn test_stops_when_no_vehicles_remain() {
    let mut sim = simulator();
    sim.vehicles_until(30.0);
    let channel = PlanChannel::new();
    let mut orch = build(sim, FixedPlan::new(channel.clone()), channel, config(3600.0));

    let summary = orch.run();
    assert_eq!(summary.stop_reason, StopReason::NoVehiclesRemaining);
    assert_eq!(summary.final_time, 30.0);
    assert!(orch.simulator().is_closed());
}

#[test]
fn test_connection_closed_ends_run_gracefully() {
    let mut sim = simulator();
    sim.close_at(20.0);
    let channel = PlanChannel::new();
    let mut orch = build(sim, FixedPlan::new(channel.clone()), channel, config(3600.0));

    let summary = orch.run();
    assert!(matches!(summary.stop_reason, StopReason::ConnectionClosed(_)));
    assert_eq!(summary.final_time, 19.0);
    assert_eq!(summary.steps, 19);
    assert!(orch.simulator().is_closed());
}

#[test]
fn test_run_reports_pending_plans_at_shutdown() {
    let mut orch = fixed(12.0);
    let summary = orch.run();

    // Scheduled at t=10, no cycle boundary before t=12
    assert_eq!(summary.plans_applied, 0);
    assert_eq!(summary.pending_plans, 1);
}
