//! Type conversion utilities for FFI boundary
//!
//! Converts between Rust types and PyO3-compatible types (PyDict, PyList, etc.)

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use std::collections::BTreeMap;

use crate::actuation::PendingPlanStore;
use crate::models::measurement::QueueMeasurement;
use crate::models::plan::GreenTimePlan;
use crate::models::signal::{SignalPhase, SignalProgram};
use crate::orchestrator::{RunSummary, StepResult, StopReason};

// ========================================================================
// PyDict Extraction Helpers
// ========================================================================

/// Extract a required field from a Python dict with clear error messages.
///
/// # Errors
/// Returns PyValueError if:
/// - Field is missing
/// - Type conversion fails
///
/// # Example
/// ```ignore
/// let duration: f64 = extract_required(&py_phase, "duration")?;
/// ```
fn extract_required<'py, T>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<T>
where
    T: FromPyObject<'py>,
{
    dict.get_item(key)?
        .ok_or_else(|| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Missing required field '{}'",
                key
            ))
        })?
        .extract()
}

/// Extract an optional field, treating `None` like a missing key.
fn extract_optional<'py, T>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Option<T>>
where
    T: FromPyObject<'py>,
{
    match dict.get_item(key)? {
        Some(value) if !value.is_none() => Ok(Some(value.extract()?)),
        _ => Ok(None),
    }
}

fn extract_with_default<'py, T>(dict: &Bound<'py, PyDict>, key: &str, default: T) -> PyResult<T>
where
    T: FromPyObject<'py>,
{
    Ok(extract_optional(dict, key)?.unwrap_or(default))
}

// ========================================================================
// Signal Programs
// ========================================================================

/// Convert a Python program dict into a SignalProgram
///
/// Expected shape:
/// `{"program_id": str, "type": str, "current_phase": int, "phases": [{"duration": float, "state": str, ...}]}`
pub fn program_from_py(py_program: &Bound<'_, PyDict>) -> PyResult<SignalProgram> {
    let py_phases: Bound<'_, PyList> = py_program
        .get_item("phases")?
        .ok_or_else(|| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>("Missing required field 'phases'")
        })?
        .downcast_into()?;

    let mut phases = Vec::with_capacity(py_phases.len());
    for py_phase in py_phases.iter() {
        let phase: Bound<'_, PyDict> = py_phase.downcast_into()?;
        phases.push(SignalPhase {
            duration: extract_required(&phase, "duration")?,
            state: extract_required(&phase, "state")?,
            min_duration: extract_optional(&phase, "min_duration")?,
            max_duration: extract_optional(&phase, "max_duration")?,
            name: extract_optional(&phase, "name")?,
        });
    }

    Ok(SignalProgram {
        program_id: extract_with_default(py_program, "program_id", "0".to_string())?,
        program_type: extract_with_default(py_program, "type", "static".to_string())?,
        current_phase: extract_with_default(py_program, "current_phase", 0)?,
        phases,
    })
}

/// Convert a SignalProgram into the dict shape read by `program_from_py`
pub fn program_to_py<'py>(
    py: Python<'py>,
    program: &SignalProgram,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("program_id", &program.program_id)?;
    dict.set_item("type", &program.program_type)?;
    dict.set_item("current_phase", program.current_phase)?;

    let phases = PyList::empty(py);
    for phase in &program.phases {
        let py_phase = PyDict::new(py);
        py_phase.set_item("duration", phase.duration)?;
        py_phase.set_item("state", &phase.state)?;
        if let Some(min) = phase.min_duration {
            py_phase.set_item("min_duration", min)?;
        }
        if let Some(max) = phase.max_duration {
            py_phase.set_item("max_duration", max)?;
        }
        if let Some(name) = &phase.name {
            py_phase.set_item("name", name)?;
        }
        phases.append(py_phase)?;
    }
    dict.set_item("phases", phases)?;

    Ok(dict)
}

// ========================================================================
// Plans and Measurements
// ========================================================================

/// Convert a controller plan `{"p": float, "s": [float, ...]}`
pub fn plan_from_py(py_plan: &Bound<'_, PyAny>) -> PyResult<GreenTimePlan> {
    let dict: &Bound<'_, PyDict> = py_plan.downcast()?;
    Ok(GreenTimePlan {
        primary: extract_required(dict, "p")?,
        secondary: extract_with_default(dict, "s", Vec::new())?,
    })
}

/// Convert a `{intersection_id: plan}` mapping
pub fn plans_from_py(py_plans: &Bound<'_, PyAny>) -> PyResult<BTreeMap<String, GreenTimePlan>> {
    let dict: &Bound<'_, PyDict> = py_plans.downcast()?;
    let mut plans = BTreeMap::new();
    for (key, value) in dict.iter() {
        plans.insert(key.extract::<String>()?, plan_from_py(&value)?);
    }
    Ok(plans)
}

/// Aggregated queues as `{intersection_id: {"p": float, "s": [float, ...]}}`
pub fn queues_to_py<'py>(
    py: Python<'py>,
    queues: &BTreeMap<String, QueueMeasurement>,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    for (id, queue) in queues {
        let entry = PyDict::new(py);
        entry.set_item("p", queue.primary)?;
        entry.set_item("s", queue.secondary.clone())?;
        dict.set_item(id, entry)?;
    }
    Ok(dict)
}

// ========================================================================
// Results
// ========================================================================

/// Convert StepResult to Python dict
pub fn step_result_to_py(py: Python, result: &StepResult) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);

    dict.set_item("time", result.time)?;
    dict.set_item("sampled", result.sampled)?;
    dict.set_item("aggregated", result.aggregated)?;
    dict.set_item("controlled", result.controlled)?;
    dict.set_item("scheduled", result.scheduled)?;
    dict.set_item("applied", result.applied)?;
    dict.set_item("discarded", result.discarded)?;
    dict.set_item("pending", result.pending)?;

    Ok(dict.unbind())
}

fn stop_reason_code(reason: &StopReason) -> &'static str {
    match reason {
        StopReason::NoVehiclesRemaining => "no_vehicles_remaining",
        StopReason::TimeBudgetExhausted => "time_budget_exhausted",
        StopReason::ConnectionClosed(_) => "connection_closed",
        StopReason::Fault(_) => "fault",
    }
}

/// Convert RunSummary to Python dict
pub fn summary_to_py(py: Python, summary: &RunSummary) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);

    dict.set_item("steps", summary.steps)?;
    dict.set_item("final_time", summary.final_time)?;
    dict.set_item("stop_reason", stop_reason_code(&summary.stop_reason))?;
    dict.set_item("stop_detail", summary.stop_reason.to_string())?;
    dict.set_item("plans_applied", summary.plans_applied)?;
    dict.set_item("pending_plans", summary.pending_plans)?;

    Ok(dict.unbind())
}

/// Pending plans as a list of `{"intersection_id", "p", "s"}` dicts
pub fn pending_plans_to_py(py: Python, store: &PendingPlanStore) -> PyResult<Py<PyList>> {
    let list = PyList::empty(py);
    for (id, plan) in store.iter() {
        let entry = PyDict::new(py);
        entry.set_item("intersection_id", id)?;
        entry.set_item("p", plan.primary)?;
        entry.set_item("s", plan.secondary.clone())?;
        list.append(entry)?;
    }
    Ok(list.unbind())
}
