//! Critical Path Method scheduling engine.
//!
//! Computes early/late dates, float, criticality and health for a task
//! hierarchy on a work calendar. Usable as a Rust library or as a Python
//! extension module.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDate;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

pub mod calendar;
mod config;
pub mod cpm;
pub mod input;
mod interner;
pub mod logging;
mod models;

pub use calendar::{Calendar, CalendarError, CalendarException};
pub use config::CpmConfig;
pub use cpm::{
    calculate, calculate_today, calculate_with_date_errors, CalcState, CpmError, CpmResult,
    CpmStats, DateError, PassKind, ValidationError,
};
pub use input::{load_project, InputError, LoadedProject};
pub use models::{ConstraintType, Dependency, Health, LinkType, ScheduleRow, Separator, Task};

/// Calculate a schedule.
///
/// # Arguments
/// * `rows` - Task and Separator objects in display order
/// * `calendar` - Work calendar (Mon-Fri when omitted)
/// * `project_anchor` - Start date for tasks without predecessors (today when omitted)
/// * `config` - Engine configuration
///
/// # Returns
/// * CpmResult with new row objects; the inputs are not modified
#[pyfunction]
#[pyo3(name = "calculate", signature = (rows, calendar=None, project_anchor=None, config=None))]
fn py_calculate(
    rows: Vec<ScheduleRow>,
    calendar: Option<Calendar>,
    project_anchor: Option<NaiveDate>,
    config: Option<CpmConfig>,
) -> CpmResult {
    let calendar = calendar.unwrap_or_default();
    let config = config.unwrap_or_default();
    match project_anchor {
        Some(anchor) => calculate(&rows, &calendar, anchor, &config),
        None => calculate_today(&rows, &calendar, &config),
    }
}

/// Calculate a schedule from a JSON project payload.
///
/// # Raises
/// * ValueError if the payload is not valid JSON or has malformed dates
#[pyfunction]
#[pyo3(signature = (payload, config=None))]
fn calculate_json(payload: &str, config: Option<CpmConfig>) -> PyResult<CpmResult> {
    let project = load_project(payload).map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(project.calculate(&config.unwrap_or_default()))
}

/// The cpm_rust Python module.
#[pymodule]
fn cpm_rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<Dependency>()?;
    m.add_class::<Task>()?;
    m.add_class::<Separator>()?;
    m.add_class::<Calendar>()?;
    m.add_class::<LinkType>()?;
    m.add_class::<ConstraintType>()?;
    m.add_class::<Health>()?;

    // Results
    m.add_class::<CpmResult>()?;
    m.add_class::<CpmStats>()?;
    m.add_class::<CalcState>()?;

    // Config types
    m.add_class::<CpmConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(py_calculate, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_json, m)?)?;

    Ok(())
}
