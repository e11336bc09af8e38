//! PyO3 wrapper for the Orchestrator
//!
//! The simulator connection and the controller stay on the Python side; this
//! module adapts them to the `Simulator` and `Controller` traits and runs the
//! stepping loop in Rust.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use super::types::{
    pending_plans_to_py, plans_from_py, program_from_py, program_to_py, queues_to_py,
    step_result_to_py, summary_to_py,
};
use crate::config::{DetectorConfig, IntersectionConfig, SimulationSettings};
use crate::control::{ControlError, ControlInput, ControlOutput, Controller, PlanChannel};
use crate::models::signal::SignalProgram;
use crate::orchestrator::Orchestrator;
use crate::simulator::{SimResult, Simulator, SimulatorError};
use tracing::{info, warn};

/// Python exception class raised when the simulator connection is gone
const FATAL_ERROR_CLASS: &str = "FatalTraCIError";

/// Map a Python exception onto the simulator error taxonomy
///
/// `kind`/`id` name the entity the call was about, for unknown-entity errors.
fn classify(py: Python<'_>, err: PyErr, kind: &'static str, id: &str) -> SimulatorError {
    let class_name = err
        .get_type(py)
        .name()
        .map(|name| name.to_string())
        .unwrap_or_default();
    let message = err.value(py).to_string();

    if class_name == FATAL_ERROR_CLASS {
        SimulatorError::ConnectionClosed(message)
    } else if message.contains("does not exist") {
        SimulatorError::UnknownEntity {
            kind,
            id: id.to_string(),
        }
    } else {
        SimulatorError::Transient(format!("{}: {}", class_name, message))
    }
}

/// Python reply of an unexpected type
fn bad_reply(method: &str, err: PyErr) -> SimulatorError {
    SimulatorError::Other(format!("{} returned an unexpected value: {}", method, err))
}

// ========================================================================
// Simulator Adapter
// ========================================================================

/// Simulator implemented by a Python object
///
/// The object must provide `step()`, `time()`, `step_length()`,
/// `min_expected_vehicles()`, `last_interval_occupancy(detector_id)`,
/// `active_program(tl_id)` (a program dict or `None`),
/// `set_program(tl_id, program)`, `current_phase(tl_id)`,
/// `next_switch(tl_id)` and `close()`.
pub struct PySimulator {
    obj: Py<PyAny>,
}

impl PySimulator {
    pub fn new(obj: Py<PyAny>) -> Self {
        Self { obj }
    }

    /// Call a method taking no argument or one entity id, and extract the reply
    fn call<T>(&self, method: &str, kind: &'static str, id: Option<&str>) -> SimResult<T>
    where
        T: for<'py> FromPyObject<'py>,
    {
        Python::with_gil(|py| {
            let obj = self.obj.bind(py);
            let reply = match id {
                None => obj.call_method0(method),
                Some(id) => obj.call_method1(method, (id,)),
            }
            .map_err(|err| classify(py, err, kind, id.unwrap_or_default()))?;
            reply.extract().map_err(|err| bad_reply(method, err))
        })
    }
}

impl Simulator for PySimulator {
    fn step(&mut self) -> SimResult<()> {
        Python::with_gil(|py| {
            self.obj
                .bind(py)
                .call_method0("step")
                .map(|_| ())
                .map_err(|err| classify(py, err, "Simulation", ""))
        })
    }

    fn time(&mut self) -> SimResult<f64> {
        self.call("time", "Simulation", None)
    }

    fn step_length(&mut self) -> SimResult<f64> {
        self.call("step_length", "Simulation", None)
    }

    fn min_expected_vehicles(&mut self) -> SimResult<usize> {
        self.call("min_expected_vehicles", "Simulation", None)
    }

    fn last_interval_occupancy(&mut self, detector_id: &str) -> SimResult<f64> {
        self.call("last_interval_occupancy", "Lane area detector", Some(detector_id))
    }

    fn active_program(&mut self, traffic_light_id: &str) -> SimResult<Option<SignalProgram>> {
        Python::with_gil(|py| {
            let reply = self
                .obj
                .bind(py)
                .call_method1("active_program", (traffic_light_id,))
                .map_err(|err| classify(py, err, "Traffic light", traffic_light_id))?;
            if reply.is_none() {
                return Ok(None);
            }
            let dict: &Bound<'_, PyDict> = reply
                .downcast()
                .map_err(|err| bad_reply("active_program", err.into()))?;
            program_from_py(dict)
                .map(Some)
                .map_err(|err| bad_reply("active_program", err))
        })
    }

    fn set_program(&mut self, traffic_light_id: &str, program: &SignalProgram) -> SimResult<()> {
        Python::with_gil(|py| {
            let py_program = program_to_py(py, program)
                .map_err(|err| SimulatorError::Other(err.to_string()))?;
            self.obj
                .bind(py)
                .call_method1("set_program", (traffic_light_id, py_program))
                .map(|_| ())
                .map_err(|err| classify(py, err, "Traffic light", traffic_light_id))
        })
    }

    fn current_phase(&mut self, traffic_light_id: &str) -> SimResult<usize> {
        self.call("current_phase", "Traffic light", Some(traffic_light_id))
    }

    fn next_switch(&mut self, traffic_light_id: &str) -> SimResult<f64> {
        self.call("next_switch", "Traffic light", Some(traffic_light_id))
    }

    fn close(&mut self) -> SimResult<()> {
        Python::with_gil(|py| {
            self.obj
                .bind(py)
                .call_method0("close")
                .map(|_| ())
                .map_err(|err| classify(py, err, "Simulation", ""))
        })
    }
}

// ========================================================================
// Controller Adapter
// ========================================================================

/// Controller implemented by a Python object
///
/// Calls `run_simulation_step(n, n_previous, qg_previous, queues)`, which
/// returns either an object with a `qg_new` attribute or a float. Plans are
/// read from the shared dict: while `is_active` is true, `green_times` is
/// moved into the plan channel and the key deleted.
pub struct PyController {
    obj: Py<PyAny>,
    shared: Py<PyAny>,
    channel: PlanChannel,
}

impl PyController {
    pub fn new(obj: Py<PyAny>, shared: Py<PyAny>, channel: PlanChannel) -> Self {
        Self {
            obj,
            shared,
            channel,
        }
    }

    fn collect_plans(&self, py: Python<'_>) -> PyResult<()> {
        let shared = self.shared.bind(py);
        let active: bool = shared
            .call_method1("get", ("is_active", false))?
            .is_truthy()?;
        self.channel.set_active(active);
        if !active || !shared.contains("green_times")? {
            return Ok(());
        }

        let green_times = shared.get_item("green_times")?;
        if green_times.is_truthy()? {
            self.channel.publish_all(plans_from_py(&green_times)?);
            shared.del_item("green_times")?;
        }
        Ok(())
    }
}

impl Controller for PyController {
    fn step(&mut self, input: &ControlInput<'_>) -> Result<ControlOutput, ControlError> {
        Python::with_gil(|py| {
            let queues = queues_to_py(py, input.queues)
                .map_err(|err| ControlError::Failed(err.to_string()))?;
            let result = self
                .obj
                .bind(py)
                .call_method1(
                    "run_simulation_step",
                    (
                        input.current_accumulation,
                        input.previous_accumulation,
                        input.previous_gate_flow,
                        queues,
                    ),
                )
                .map_err(|err| ControlError::Failed(err.to_string()))?;

            let gate_flow: f64 = match result.getattr("qg_new") {
                Ok(value) => value.extract(),
                Err(_) => result.extract(),
            }
            .map_err(|err| ControlError::InvalidOutput(err.to_string()))?;

            self.collect_plans(py)
                .map_err(|err| ControlError::Failed(format!("reading shared plans: {}", err)))?;

            Ok(ControlOutput { gate_flow })
        })
    }
}

// ========================================================================
// Pipeline Class
// ========================================================================

type PyOrchestrator = Orchestrator<PySimulator, PyController, IntersectionConfig>;

/// Python wrapper for the Rust pipeline
///
/// # Example (from Python)
///
/// ```python
/// from perimeter_control_core_rs import Pipeline
///
/// pipeline = Pipeline(
///     simulator, controller, shared_dict,
///     open("simulation.yml").read(),
///     open("detector_config.json").read(),
///     open("intersection_config.json").read(),
/// )
/// summary = pipeline.run()
/// print(f"{summary['steps']} steps, stopped: {summary['stop_reason']}")
/// ```
#[pyclass(name = "Pipeline", unsendable)]
pub struct PyPipeline {
    inner: PyOrchestrator,
}

#[pymethods]
impl PyPipeline {
    /// Create a pipeline from a live simulator, a controller and the three
    /// configuration documents (as text)
    ///
    /// # Errors
    ///
    /// Raises ValueError if a document does not parse or a cadence is invalid
    #[new]
    fn new(
        simulator: Py<PyAny>,
        controller: Py<PyAny>,
        shared_dict: Py<PyAny>,
        settings_yaml: &str,
        detectors_json: &str,
        intersections_json: &str,
    ) -> PyResult<Self> {
        let to_value_error =
            |e: crate::config::ConfigError| PyErr::new::<PyValueError, _>(e.to_string());

        let settings = SimulationSettings::from_yaml_str(settings_yaml).map_err(to_value_error)?;
        let detectors = DetectorConfig::from_json_str(detectors_json).map_err(to_value_error)?;
        let topology =
            IntersectionConfig::from_json_str(intersections_json).map_err(to_value_error)?;
        let config = settings.to_pipeline_config().map_err(to_value_error)?;

        for issue in topology.validate_against(&detectors) {
            warn!(issue = %issue, "configuration issue");
        }

        let channel = PlanChannel::new();
        let inner = Orchestrator::new(
            PySimulator::new(simulator),
            PyController::new(controller, shared_dict, channel.clone()),
            channel,
            topology,
            &detectors,
            config,
        )
        .map_err(|e| PyErr::new::<PyValueError, _>(e.to_string()))?;

        info!("pipeline created");
        Ok(PyPipeline { inner })
    }

    /// Read the step length, advance one step and seed the initial reading
    fn start(&mut self) -> PyResult<()> {
        self.inner
            .start()
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Start failed: {}", e)))
    }

    /// Execute one simulation step
    ///
    /// # Returns
    ///
    /// Dictionary containing step results:
    /// - `time`: Simulated time after the step
    /// - `sampled`, `aggregated`, `controlled`: Which cadences fired
    /// - `scheduled`: Plans moved into the pending store
    /// - `applied`: Plans written to the simulator
    /// - `discarded`: Plans dropped for vanished intersections
    /// - `pending`: Plans still waiting for a cycle boundary
    fn tick(&mut self, py: Python) -> PyResult<Py<PyDict>> {
        let result = self
            .inner
            .tick()
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Step failed: {}", e)))?;

        step_result_to_py(py, &result)
    }

    /// Run to completion and close the simulator
    fn run(&mut self, py: Python) -> PyResult<Py<PyDict>> {
        let summary = self.inner.run();
        summary_to_py(py, &summary)
    }

    /// Plans waiting for their intersection's next cycle boundary
    fn pending_plans(&self, py: Python) -> PyResult<Py<PyList>> {
        pending_plans_to_py(py, self.inner.pending_plans())
    }

    /// The `(time, n(k))` trace of every aggregation so far
    fn accumulation_series(&self) -> Vec<(f64, f64)> {
        self.inner.event_log().accumulation_series()
    }

    /// Get current simulated time
    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    /// Get number of simulator steps executed
    fn steps(&self) -> usize {
        self.inner.steps()
    }
}
