//! Types shared by the CPM passes: per-node state, run states and errors.

use chrono::NaiveDate;
use pyo3::prelude::*;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::calendar::CalendarError;
use crate::interner::NodeId;
use crate::models::{ConstraintType, Health, Task};

/// Malformed or unresolvable dates, scoped to a single task.
///
/// The task's date fields stay unset; every other task is still scheduled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("task {task_id}: {source}")]
    Calendar {
        task_id: String,
        #[source]
        source: CalendarError,
    },
    #[error("task {task_id}: {constraint:?} constraint has no constraint date")]
    MissingConstraintDate {
        task_id: String,
        constraint: ConstraintType,
    },
    #[error("task {task_id}: malformed date {value:?}")]
    Malformed { task_id: String, value: String },
}

impl DateError {
    pub(crate) fn calendar(task: &Task, source: CalendarError) -> Self {
        DateError::Calendar {
            task_id: task.id.clone(),
            source,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            DateError::Calendar { task_id, .. }
            | DateError::MissingConstraintDate { task_id, .. }
            | DateError::Malformed { task_id, .. } => task_id,
        }
    }
}

/// Which fixed-point pass failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    Forward,
    Backward,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::Forward => write!(f, "forward"),
            PassKind::Backward => write!(f, "backward"),
        }
    }
}

/// Whole-run failures. The run still returns a partial, flagged result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpmError {
    #[error(
        "{pass} pass did not converge after {iterations} iterations (unsettled: [{}], cycle: [{}])",
        .unsettled.join(", "),
        .cycle.join(", ")
    )]
    Convergence {
        pass: PassKind,
        iterations: u32,
        unsettled: Vec<String>,
        cycle: Vec<String>,
    },
    #[error("calendar has no working days")]
    NoWorkingDays,
}

/// Structural input problems. Reported as warnings, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate task id {task_id}; later row ignored")]
    DuplicateTaskId { task_id: String },
    #[error("task {task_id} depends on unknown task {predecessor_id}")]
    UnknownPredecessor {
        task_id: String,
        predecessor_id: String,
    },
    #[error("task {task_id} depends on summary task {predecessor_id}")]
    SummaryPredecessor {
        task_id: String,
        predecessor_id: String,
    },
    #[error("summary task {task_id} has {count} dependencies; ignored")]
    ParentDependenciesIgnored { task_id: String, count: usize },
    #[error("task {task_id} has unknown parent {parent_id}; treated as top level")]
    UnknownParent { task_id: String, parent_id: String },
    #[error("parent chain of task {task_id} loops; treated as top level")]
    HierarchyCycle { task_id: String },
    #[error("dependency cycle through [{}]", .task_ids.join(", "))]
    DependencyCycle { task_ids: Vec<String> },
}

/// Stages of one calculation run.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CalcState {
    Idle,
    BuildingIndex,
    ForwardPass,
    RollupParents,
    BackwardPass,
    ComputingFloat,
    MarkingCritical,
    AnalyzingHealth,
    Done,
    Failed,
}

impl fmt::Display for CalcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A pass that stopped early, with the nodes it could not settle.
#[derive(Debug)]
pub(crate) struct PassFailure {
    pub error: CpmError,
    pub unsettled: Vec<NodeId>,
}

/// Calculated state of one task node while the passes run.
#[derive(Clone, Debug, Default)]
pub(crate) struct NodeSchedule {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub late_start: Option<NaiveDate>,
    pub late_finish: Option<NaiveDate>,
    pub total_float: Option<i64>,
    pub free_float: Option<i64>,
    pub is_critical: bool,
    pub health: Option<Health>,
    /// Rolled-up work-day span (parents only).
    pub span: Option<u32>,
    pub date_error: Option<DateError>,
}

impl NodeSchedule {
    /// Drop every date and remember why.
    pub fn fail(&mut self, error: DateError) {
        self.start = None;
        self.end = None;
        self.late_start = None;
        self.late_finish = None;
        self.date_error = Some(error);
    }
}

pub(crate) fn serialize_display_option<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    match value {
        Some(v) => serializer.serialize_some(&v.to_string()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::ptr_arg)]
pub(crate) fn serialize_display_seq<T, S>(values: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    serializer.collect_seq(values.iter().map(|v| v.to_string()))
}
