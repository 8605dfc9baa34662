//! Configuration for a CPM calculation run.

use pyo3::prelude::*;

/// Tuning knobs for the CPM engine.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpmConfig {
    /// Cap on fixed-point iterations per pass. Exceeding it fails the run
    /// with a convergence error (usually a dependency cycle).
    #[pyo3(get, set)]
    pub max_iterations: u32,
    /// Verbosity level: 0=silent, 1=stages, 2=tasks, 3=debug.
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Let FNLT/SNLT deadlines tighten late dates in the backward pass.
    /// Off by default: deadline misses are then reported by health analysis only.
    #[pyo3(get, set)]
    pub deadlines_tighten_late_dates: bool,
    /// Deadline misses beyond this many work days are a critical failure.
    #[pyo3(get, set)]
    pub critical_failure_days: i64,
    /// Critical tasks with total float below this are at risk.
    #[pyo3(get, set)]
    pub at_risk_float_days: i64,
}

impl Default for CpmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            verbosity: 0,
            deadlines_tighten_late_dates: false,
            critical_failure_days: 3,
            at_risk_float_days: 2,
        }
    }
}

#[pymethods]
impl CpmConfig {
    #[new]
    #[pyo3(signature = (
        max_iterations=None,
        verbosity=None,
        deadlines_tighten_late_dates=None,
        critical_failure_days=None,
        at_risk_float_days=None
    ))]
    fn new(
        max_iterations: Option<u32>,
        verbosity: Option<u8>,
        deadlines_tighten_late_dates: Option<bool>,
        critical_failure_days: Option<i64>,
        at_risk_float_days: Option<i64>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            max_iterations: max_iterations.unwrap_or(defaults.max_iterations),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            deadlines_tighten_late_dates: deadlines_tighten_late_dates
                .unwrap_or(defaults.deadlines_tighten_late_dates),
            critical_failure_days: critical_failure_days
                .unwrap_or(defaults.critical_failure_days),
            at_risk_float_days: at_risk_float_days.unwrap_or(defaults.at_risk_float_days),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "CpmConfig(max_iterations={}, verbosity={}, deadlines_tighten_late_dates={})",
            self.max_iterations, self.verbosity, self.deadlines_tighten_late_dates
        )
    }
}
