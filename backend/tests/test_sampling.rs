//! Tests for detector sampling and aggregation
//!
//! Covers the occupancy to vehicle conversion, degraded readings on query
//! failures, and buffer means and clearing.

use perimeter_control_core_rs::aggregation::mean;
use perimeter_control_core_rs::simulator::scripted::ScriptedSimulator;
use perimeter_control_core_rs::{
    DetectorSampler, OccupancyModel, Reading, SampleBuffers, Simulator, SimulatorError,
};
use proptest::prelude::*;

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn sim_with(occupancies: &[(&str, f64)]) -> ScriptedSimulator {
    let mut sim = ScriptedSimulator::new(1.0);
    for (id, occ) in occupancies {
        sim.set_occupancy(*id, *occ);
    }
    sim
}

// ============================================================================
// Detector Sampler
// ============================================================================

#[test]
fn test_empty_group_sums_to_zero() {
    let sampler = DetectorSampler::default();
    let mut sim = sim_with(&[]);

    let reading = sampler.sample(&mut sim, &[]).unwrap();
    assert_eq!(reading, Reading::Measured(0.0));
}

#[test]
fn test_half_occupied_detector() {
    let sampler = DetectorSampler::new(OccupancyModel::default());
    let mut sim = sim_with(&[("e2_0", 50.0)]);

    let value = sampler.sample(&mut sim, &ids(&["e2_0"])).unwrap().value();
    assert!((value - 13.33).abs() < 0.01, "got {}", value);
}

#[test]
fn test_identical_detectors_are_summed() {
    let sampler = DetectorSampler::default();
    let mut sim = sim_with(&[("e2_0", 50.0), ("e2_1", 50.0)]);

    let value = sampler
        .sample(&mut sim, &ids(&["e2_0", "e2_1"]))
        .unwrap()
        .value();
    assert!((value - 26.67).abs() < 0.01, "got {}", value);
}

#[test]
fn test_lane_count_scales_estimate() {
    let model = OccupancyModel {
        lane_count: 2,
        ..Default::default()
    };
    let sampler = DetectorSampler::new(model);
    let mut sim = sim_with(&[("e2_0", 30.0)]);

    let value = sampler.sample(&mut sim, &ids(&["e2_0"])).unwrap().value();
    assert!((value - 16.0).abs() < 1e-9);
}

#[test]
fn test_failed_query_degrades_whole_reading() {
    let sampler = DetectorSampler::default();
    let mut sim = sim_with(&[("e2_0", 50.0), ("e2_1", 50.0)]);
    sim.fail_detector("e2_1");

    let reading = sampler.sample(&mut sim, &ids(&["e2_0", "e2_1"])).unwrap();
    assert_eq!(reading, Reading::Degraded);
    assert_eq!(reading.value(), 0.0);

    // Self-corrects on the next call once the detector answers again
    sim.restore_detector("e2_1");
    let reading = sampler.sample(&mut sim, &ids(&["e2_0", "e2_1"])).unwrap();
    assert!(!reading.is_degraded());
}

#[test]
fn test_unknown_detector_degrades_reading() {
    let sampler = DetectorSampler::default();
    let mut sim = sim_with(&[("e2_0", 10.0)]);

    let reading = sampler.sample(&mut sim, &ids(&["e2_0", "missing"])).unwrap();
    assert!(reading.is_degraded());
}

#[test]
fn test_unexpected_detector_error_degrades_without_propagating() {
    let sampler = DetectorSampler::default();
    let mut sim = sim_with(&[("e2_0", 50.0), ("e2_1", 50.0)]);
    sim.fail_detector_with(
        "e2_0",
        SimulatorError::Other("reply was not a number".to_string()),
    );

    let reading = sampler.sample(&mut sim, &ids(&["e2_0", "e2_1"])).unwrap();
    assert_eq!(reading, Reading::Degraded);
    assert_eq!(reading.value(), 0.0);
}

#[test]
fn test_closed_connection_propagates() {
    let sampler = DetectorSampler::default();
    let mut sim = sim_with(&[("e2_0", 10.0)]);
    sim.close().unwrap();

    let err = sampler.sample(&mut sim, &ids(&["e2_0"])).unwrap_err();
    assert!(matches!(err, SimulatorError::ConnectionClosed(_)));
}

// ============================================================================
// Sample Buffers
// ============================================================================

#[test]
fn test_aggregate_takes_means() {
    let mut buffers = SampleBuffers::new([("J1", 2)]);
    for v in [3.0, 6.0, 9.0] {
        buffers.push_network(v);
        buffers.push_primary("J1", v * 2.0);
        buffers.push_secondary("J1", 0, 1.0);
    }

    let (measurement, samples) = buffers.aggregate();
    assert_eq!(samples, 3);
    assert_eq!(measurement.accumulation, 6.0);

    let queue = measurement.queue("J1").unwrap();
    assert_eq!(queue.primary, 12.0);
    // Group 1 never received a sample
    assert_eq!(queue.secondary, vec![1.0, 0.0]);
}

#[test]
fn test_buffers_empty_after_aggregation() {
    let mut buffers = SampleBuffers::new([("J1", 1), ("J2", 0)]);
    buffers.push_network(1.0);
    buffers.push_primary("J2", 4.0);
    buffers.push_secondary("J1", 0, 2.0);
    assert!(!buffers.is_empty());

    buffers.aggregate();
    assert!(buffers.is_empty());
    assert_eq!(buffers.network_len(), 0);
    assert_eq!(buffers.primary_len("J2"), Some(0));
    assert_eq!(buffers.secondary_len("J1", 0), Some(0));

    // The next window starts from nothing
    buffers.push_network(10.0);
    let (measurement, samples) = buffers.aggregate();
    assert_eq!(samples, 1);
    assert_eq!(measurement.accumulation, 10.0);
}

#[test]
fn test_empty_window_publishes_zero() {
    let mut buffers = SampleBuffers::new([("J1", 1)]);
    buffers.push_network(8.0);
    buffers.aggregate();

    let (measurement, samples) = buffers.aggregate();
    assert_eq!(samples, 0);
    assert_eq!(measurement.accumulation, 0.0);
}

proptest! {
    #[test]
    fn prop_mean_matches_sum_over_count(values in proptest::collection::vec(0.0f64..500.0, 1..50)) {
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        prop_assert!((mean(&values) - expected).abs() < 1e-9);

        let mut buffers = SampleBuffers::new(Vec::<(String, usize)>::new());
        for v in &values {
            buffers.push_network(*v);
        }
        let (measurement, samples) = buffers.aggregate();
        prop_assert_eq!(samples, values.len());
        prop_assert!((measurement.accumulation - expected).abs() < 1e-9);
        prop_assert!(buffers.is_empty());
    }

    #[test]
    fn prop_mean_is_bounded(values in proptest::collection::vec(0.0f64..500.0, 1..50)) {
        let m = mean(&values);
        let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(m >= lo - 1e-9 && m <= hi + 1e-9);
    }
}
