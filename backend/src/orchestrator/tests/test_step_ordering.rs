// Ordering of the pipeline stages inside one step
//
// Control runs before actuation in every step, but a plan scheduled by the
// control stage must wait for the next step before it can be applied.

use crate::config::{DetectorConfig, IntersectionConfig};
use crate::control::{ControlError, ControlInput, ControlOutput, Controller, PlanChannel};
use crate::models::plan::GreenTimePlan;
use crate::models::signal::{SignalPhase, SignalProgram};
use crate::orchestrator::engine::{Orchestrator, PipelineConfig};
use crate::simulator::scripted::ScriptedSimulator;

struct Publishing {
    channel: PlanChannel,
    seen: Vec<(f64, f64)>,
}

impl Controller for Publishing {
    fn step(&mut self, input: &ControlInput<'_>) -> Result<ControlOutput, ControlError> {
        self.seen
            .push((input.current_accumulation, input.previous_accumulation));
        self.channel.publish("J1", GreenTimePlan::new(30.0, vec![12.0]));
        self.channel.set_active(true);
        Ok(ControlOutput { gate_flow: 0.0 })
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

fn build() -> Orchestrator<ScriptedSimulator, Publishing, IntersectionConfig> {
    let detectors = DetectorConfig::from_json_str(
        r#"{
            "algorithm_input_detectors": {"detector_ids": ["n0"]},
            "solver_input_detectors": {"intersections": {
                "J1": {"phases": {"p": {"queue_detectors": ["q_p"]}, "s": [{"queue_detectors": ["q_s"]}]}}
            }}
        }"#,
    )
    .unwrap();
    let topology = IntersectionConfig::from_json_str(
        r#"{
            "traffic_lights": {"J1": {"phases": []}},
            "optimization_parameters": {"intersection_data": {
                "J1": {"phases": {"p": {"phase_indices": [2]}, "s": [{"phase_indices": [5]}]}}
            }}
        }"#,
    )
    .unwrap();

    let mut sim = ScriptedSimulator::new(1.0);
    sim.set_occupancy("n0", 50.0);
    sim.set_occupancy("q_p", 0.0);
    sim.set_occupancy("q_s", 0.0);
    sim.add_traffic_light("J1", program());

    let channel = PlanChannel::new();
    let controller = Publishing {
        channel: channel.clone(),
        seen: Vec::new(),
    };
    let config = PipelineConfig {
        sampling_interval_s: 1.0,
        aggregation_interval_s: 5.0,
        control_interval_s: 5.0,
        total_simulation_time_s: 100.0,
        ..Default::default()
    };

    Orchestrator::new(sim, controller, channel, topology, &detectors, config).unwrap()
}

#[test]
fn test_plan_scheduled_at_a_boundary_waits_for_the_next_step() {
    let mut orch = build();
    orch.start().unwrap();
    for _ in 0..3 {
        orch.tick().unwrap();
    }
    assert_eq!(orch.current_time(), 4.0);

    // Last phase, switching at t=6: the step reaching t=5 is a cycle boundary
    orch.simulator_mut().set_phase("J1", 6, 2.0);

    let result = orch.tick().unwrap();
    assert_eq!(result.time, 5.0);
    assert!(result.controlled);
    assert_eq!(result.scheduled, 1);
    assert_eq!(result.applied, 0);
    assert_eq!(result.pending, 1);
    assert!(orch.simulator().program_writes().is_empty());

    // t=6 starts a new cycle, so the plan keeps waiting for the next boundary
    let result = orch.tick().unwrap();
    assert_eq!(result.applied, 0);
    assert!(orch.pending_plans().contains("J1"));
}

#[test]
fn test_plan_lands_at_the_following_cycle_boundary() {
    let mut orch = build();
    orch.start().unwrap();
    for _ in 0..3 {
        orch.tick().unwrap();
    }
    orch.simulator_mut().set_phase("J1", 6, 2.0);

    let mut applied_at = None;
    for _ in 0..60 {
        let result = orch.tick().unwrap();
        if result.applied > 0 {
            applied_at = Some(result.time);
            break;
        }
    }

    // New cycle from t=6: phases end at 16, 19, 29, 32, 42, 45, 50
    assert_eq!(applied_at, Some(49.0));
    let writes = orch.simulator().program_writes();
    assert_eq!(writes.len(), 1);
    let durations: Vec<f64> = writes[0].program.phases.iter().map(|p| p.duration).collect();
    assert_eq!(durations, vec![10.0, 3.0, 30.0, 3.0, 10.0, 12.0, 5.0]);
    assert!(orch.pending_plans().is_empty());
}

#[test]
fn test_initial_reading_seeds_previous_accumulation() {
    let mut orch = build();
    orch.start().unwrap();

    let expected = 80.0 * 0.5 / 3.0;
    assert_eq!(orch.current_time(), 1.0);
    assert!((orch.adapter().previous_accumulation() - expected).abs() < 1e-9);
    assert!((orch.measurement().accumulation - expected).abs() < 1e-9);

    while orch.controller().seen.is_empty() {
        orch.tick().unwrap();
    }
    let (current, previous) = orch.controller().seen[0];
    assert!((current - expected).abs() < 1e-9);
    assert!((previous - expected).abs() < 1e-9);
}

#[test]
fn test_tick_before_start_is_rejected() {
    let mut orch = build();
    assert!(orch.tick().is_err());
    assert_eq!(orch.steps(), 0);
}
