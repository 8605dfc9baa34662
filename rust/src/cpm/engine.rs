//! CPM orchestration: runs the passes in order and assembles the result.
//!
//! One call is one run. The engine holds no state between runs, so the output
//! depends only on the rows, calendar, anchor and config (and the wall clock
//! for `calc_time_ms`).

use chrono::NaiveDate;
use pyo3::prelude::*;
use serde::Serialize;
use std::time::Instant;

use crate::calendar::Calendar;
use crate::config::CpmConfig;
use crate::interner::NodeId;
use crate::models::{Health, ScheduleRow, Task};
use crate::{log_stage, log_task};

use super::backward::backward_pass;
use super::critical::mark_critical;
use super::float::compute_float;
use super::forward::forward_pass;
use super::health::{analyze_health, mark_blocked};
use super::index::ScheduleGraph;
use super::rollup::{rollup_dates, rollup_late_dates};
use super::types::{
    serialize_display_option, serialize_display_seq, CalcState, CpmError, DateError, NodeSchedule,
    PassFailure, PassKind, ValidationError,
};

/// Summary of one calculation run.
#[pyclass]
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpmStats {
    #[pyo3(get)]
    pub calc_time_ms: f64,
    #[pyo3(get)]
    pub task_count: usize,
    #[pyo3(get)]
    pub critical_count: usize,
    #[pyo3(get)]
    pub project_start: Option<NaiveDate>,
    #[pyo3(get)]
    pub project_end: Option<NaiveDate>,
    /// Work days from project start to project end, inclusive.
    #[pyo3(get)]
    pub duration: i64,
    #[pyo3(get)]
    pub forward_iterations: u32,
    #[pyo3(get)]
    pub backward_iterations: u32,
    #[serde(serialize_with = "serialize_display_option")]
    pub error: Option<CpmError>,
    #[serde(serialize_with = "serialize_display_seq")]
    pub warnings: Vec<ValidationError>,
    #[serde(serialize_with = "serialize_display_seq")]
    pub date_errors: Vec<DateError>,
}

#[pymethods]
impl CpmStats {
    #[getter(error)]
    fn py_error(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    #[getter(warnings)]
    fn py_warnings(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    #[getter(date_errors)]
    fn py_date_errors(&self) -> Vec<String> {
        self.date_errors.iter().map(ToString::to_string).collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "CpmStats(tasks={}, critical={}, start={:?}, end={:?}, error={:?})",
            self.task_count,
            self.critical_count,
            self.project_start,
            self.project_end,
            self.py_error()
        )
    }
}

/// Rows with calculated fields, run statistics and the final state.
#[pyclass]
#[derive(Clone, Debug, Serialize)]
pub struct CpmResult {
    pub tasks: Vec<ScheduleRow>,
    #[pyo3(get)]
    pub stats: CpmStats,
    #[pyo3(get)]
    pub state: CalcState,
}

impl CpmResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Output task row by id (first row wins on duplicates).
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .filter_map(ScheduleRow::as_task)
            .find(|task| task.id == id)
    }

    pub fn is_failed(&self) -> bool {
        self.state == CalcState::Failed
    }
}

#[pymethods]
impl CpmResult {
    #[getter(tasks)]
    fn py_tasks(&self) -> Vec<ScheduleRow> {
        self.tasks.clone()
    }

    #[pyo3(name = "to_json")]
    fn py_to_json(&self) -> PyResult<String> {
        self.to_json()
            .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "CpmResult(rows={}, state={}, error={:?})",
            self.tasks.len(),
            self.state,
            self.stats.py_error()
        )
    }
}

fn transition(state: &mut CalcState, next: CalcState, verbosity: u8) {
    log_stage!(verbosity, "{} -> {}", state, next);
    *state = next;
}

fn leaf_end(graph: &ScheduleGraph<'_>, schedule: &[NodeSchedule]) -> Option<NaiveDate> {
    graph
        .leaf_order
        .iter()
        .filter_map(|&node| schedule[node as usize].end)
        .max()
}

/// The pipeline from the forward pass to health analysis.
fn run_passes(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    project_anchor: NaiveDate,
    config: &CpmConfig,
    schedule: &mut [NodeSchedule],
    stats: &mut CpmStats,
    state: &mut CalcState,
) -> Result<(), PassFailure> {
    let verbosity = config.verbosity;

    if !calendar.has_working_days() {
        return Err(PassFailure {
            error: CpmError::NoWorkingDays,
            unsettled: graph.leaf_order.clone(),
        });
    }

    transition(state, CalcState::ForwardPass, verbosity);
    stats.forward_iterations = forward_pass(graph, calendar, project_anchor, config, schedule)?;

    transition(state, CalcState::RollupParents, verbosity);
    rollup_dates(graph, calendar, schedule);

    transition(state, CalcState::BackwardPass, verbosity);
    if let Some(project_end) = leaf_end(graph, schedule) {
        stats.backward_iterations = backward_pass(graph, calendar, config, project_end, schedule)?;
    }
    rollup_late_dates(graph, schedule);

    if !graph.cycle.is_empty() {
        // Both passes settled despite the loop (e.g. SS links with no lag).
        stats.warnings.push(ValidationError::DependencyCycle {
            task_ids: graph.ids(&graph.cycle),
        });
    }

    transition(state, CalcState::ComputingFloat, verbosity);
    compute_float(graph, calendar, schedule);

    transition(state, CalcState::MarkingCritical, verbosity);
    stats.critical_count = mark_critical(graph, schedule);

    transition(state, CalcState::AnalyzingHealth, verbosity);
    analyze_health(graph, calendar, config, schedule);

    Ok(())
}

/// Finish a failed run for the leaves the failure did not reach.
///
/// Leaves linked to an unsettled leaf (in either direction) are classified
/// without dates, so they come out Blocked; their early dates are put back
/// afterwards. The rest get late dates, float, criticality and health as in a
/// successful run. Returns the critical leaf count, or `None` when the settled
/// part does not converge backward either.
fn complete_settled(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    config: &CpmConfig,
    failure: &PassFailure,
    schedule: &mut [NodeSchedule],
) -> Option<usize> {
    let affected = graph.connected_to(&failure.unsettled);
    let mut partial = schedule.to_vec();
    for (node, slot) in partial.iter_mut().enumerate() {
        slot.late_start = None;
        slot.late_finish = None;
        if affected[node] {
            slot.start = None;
            slot.end = None;
        }
    }

    // Early dates behind a failed forward pass are unstable; only the settled
    // part defines the project end then.
    let project_end = match failure.error {
        CpmError::Convergence {
            pass: PassKind::Backward,
            ..
        } => leaf_end(graph, schedule),
        _ => leaf_end(graph, &partial),
    };
    if let Some(project_end) = project_end {
        backward_pass(graph, calendar, config, project_end, &mut partial).ok()?;
    }
    compute_float(graph, calendar, &mut partial);
    let critical = mark_critical(graph, &mut partial);
    analyze_health(graph, calendar, config, &mut partial);

    for &node in &graph.leaf_order {
        if affected[node as usize] {
            partial[node as usize].start = schedule[node as usize].start;
            partial[node as usize].end = schedule[node as usize].end;
        }
    }
    rollup_dates(graph, calendar, &mut partial);
    rollup_late_dates(graph, &mut partial);
    schedule.clone_from_slice(&partial);
    Some(critical)
}

/// Fallback when nothing can be classified: roll up what dates exist and
/// block every leaf that did not settle or cannot be scheduled.
fn block_all(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    failure: &PassFailure,
    schedule: &mut [NodeSchedule],
) {
    rollup_dates(graph, calendar, schedule);
    rollup_late_dates(graph, schedule);

    let mut blocked: Vec<NodeId> = failure.unsettled.clone();
    blocked.extend(graph.leaf_order.iter().copied().filter(|&node| {
        schedule[node as usize].date_error.is_some() || graph.unresolved[node as usize]
    }));
    mark_blocked(graph, schedule, &blocked);
}

fn write_back(task: &Task, node: &NodeSchedule, is_parent: bool) -> Task {
    let mut task = task.clone();
    task.clear_calculated();
    task.start = node.start;
    task.end = node.end;
    task.late_start = node.late_start;
    task.late_finish = node.late_finish;
    task.total_float = node.total_float;
    task.free_float = node.free_float;
    task.is_critical = node.is_critical;
    task.health = node.health;
    if is_parent {
        if let Some(span) = node.span {
            task.duration = span;
        }
    }
    task
}

/// Calculate the schedule of `rows`.
///
/// Never fails: run-level problems land in `stats.error` with `state` set to
/// `Failed`, structural problems in `stats.warnings`, and task-scoped date
/// problems in `stats.date_errors`.
pub fn calculate(
    rows: &[ScheduleRow],
    calendar: &Calendar,
    project_anchor: NaiveDate,
    config: &CpmConfig,
) -> CpmResult {
    calculate_with_date_errors(rows, calendar, project_anchor, config, &[])
}

/// `calculate` for rows whose dates already failed to parse.
///
/// Each task named by `date_errors` starts the run failed: no dates, Blocked,
/// and its successors Blocked behind it.
pub fn calculate_with_date_errors(
    rows: &[ScheduleRow],
    calendar: &Calendar,
    project_anchor: NaiveDate,
    config: &CpmConfig,
    date_errors: &[DateError],
) -> CpmResult {
    let timer = Instant::now();
    let verbosity = config.verbosity;
    let mut state = CalcState::Idle;

    transition(&mut state, CalcState::BuildingIndex, verbosity);
    let graph = ScheduleGraph::build(rows, verbosity);
    let mut schedule = vec![NodeSchedule::default(); graph.len()];
    let mut stats = CpmStats {
        task_count: graph.len(),
        warnings: graph.warnings.clone(),
        ..Default::default()
    };

    let mut orphan_errors = Vec::new();
    for error in date_errors {
        match graph.interner.get(error.task_id()) {
            Some(node) => {
                log_task!(verbosity, "{}", error);
                schedule[node as usize].fail(error.clone());
            }
            None => orphan_errors.push(error.clone()),
        }
    }

    match run_passes(
        &graph,
        calendar,
        project_anchor,
        config,
        &mut schedule,
        &mut stats,
        &mut state,
    ) {
        Ok(()) => transition(&mut state, CalcState::Done, verbosity),
        Err(failure) => {
            log_stage!(verbosity, "calculation failed: {}", failure.error);
            stats.critical_count =
                match complete_settled(&graph, calendar, config, &failure, &mut schedule) {
                    Some(critical) => critical,
                    None => {
                        block_all(&graph, calendar, &failure, &mut schedule);
                        0
                    }
                };
            stats.error = Some(failure.error);
            transition(&mut state, CalcState::Failed, verbosity);
        }
    }

    stats.date_errors = schedule
        .iter()
        .filter_map(|node| node.date_error.clone())
        .chain(orphan_errors)
        .collect();
    stats.project_start = graph
        .leaf_order
        .iter()
        .filter_map(|&node| schedule[node as usize].start)
        .min();
    stats.project_end = leaf_end(&graph, &schedule);
    stats.duration = match (stats.project_start, stats.project_end) {
        (Some(start), Some(end)) => calendar.work_days_between(start, end) + 1,
        _ => 0,
    };

    let tasks = rows
        .iter()
        .zip(&graph.row_nodes)
        .map(|(row, node)| match (row, node) {
            (ScheduleRow::Task(task), Some(node)) => ScheduleRow::Task(write_back(
                task,
                &schedule[*node as usize],
                graph.is_parent(*node),
            )),
            // Later row with an already-used id.
            (ScheduleRow::Task(task), None) => {
                let mut task = task.clone();
                task.clear_calculated();
                task.health = Some(Health::Blocked);
                ScheduleRow::Task(task)
            }
            (ScheduleRow::Separator(separator), _) => ScheduleRow::Separator(separator.clone()),
        })
        .collect();

    stats.calc_time_ms = timer.elapsed().as_secs_f64() * 1000.0;
    log_stage!(
        verbosity,
        "{} tasks, {} critical, {:?}..{:?} in {:.3}ms",
        stats.task_count,
        stats.critical_count,
        stats.project_start,
        stats.project_end,
        stats.calc_time_ms
    );

    CpmResult {
        tasks,
        stats,
        state,
    }
}

/// `calculate` anchored at today's local date.
pub fn calculate_today(rows: &[ScheduleRow], calendar: &Calendar, config: &CpmConfig) -> CpmResult {
    calculate(rows, calendar, chrono::Local::now().date_naive(), config)
}
