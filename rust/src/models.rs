//! Core data types for the CPM engine.

use chrono::NaiveDate;
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

/// Relationship between a predecessor and its successor.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// Successor starts after the predecessor finishes.
    #[default]
    #[pyo3(name = "FS")]
    #[serde(rename = "FS")]
    FinishToStart,
    /// Successor starts after the predecessor starts.
    #[pyo3(name = "SS")]
    #[serde(rename = "SS")]
    StartToStart,
    /// Successor finishes after the predecessor finishes.
    #[pyo3(name = "FF")]
    #[serde(rename = "FF")]
    FinishToFinish,
    /// Successor finishes after the predecessor starts.
    #[pyo3(name = "SF")]
    #[serde(rename = "SF")]
    StartToFinish,
}

impl LinkType {
    pub fn code(self) -> &'static str {
        match self {
            LinkType::FinishToStart => "FS",
            LinkType::StartToStart => "SS",
            LinkType::FinishToFinish => "FF",
            LinkType::StartToFinish => "SF",
        }
    }
}

/// Date constraint on a task, independent of its dependencies.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConstraintType {
    /// As soon as possible (no constraint).
    #[default]
    #[pyo3(name = "ASAP")]
    Asap,
    /// Start no earlier than.
    #[pyo3(name = "SNET")]
    Snet,
    /// Start no later than (deadline, checked by health analysis).
    #[pyo3(name = "SNLT")]
    Snlt,
    /// Finish no earlier than.
    #[pyo3(name = "FNET")]
    Fnet,
    /// Finish no later than (deadline, checked by health analysis).
    #[pyo3(name = "FNLT")]
    Fnlt,
    /// Must finish on.
    #[pyo3(name = "MFO")]
    Mfo,
}

impl ConstraintType {
    /// Constraints that move the task in the forward pass and therefore need a date.
    pub fn requires_date(self) -> bool {
        matches!(
            self,
            ConstraintType::Snet | ConstraintType::Fnet | ConstraintType::Mfo
        )
    }
}

/// Schedule health classification, most severe first.
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Health {
    #[pyo3(name = "BLOCKED")]
    Blocked,
    #[pyo3(name = "CRITICAL_FAILURE")]
    CriticalFailure,
    #[pyo3(name = "AT_RISK")]
    AtRisk,
    #[pyo3(name = "HEALTHY")]
    Healthy,
}

impl Health {
    /// Higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            Health::Healthy => 0,
            Health::AtRisk => 1,
            Health::CriticalFailure => 2,
            Health::Blocked => 3,
        }
    }

    /// The more severe of two classifications.
    pub fn worst(self, other: Health) -> Health {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// A dependency on a predecessor task.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    #[pyo3(get, set)]
    pub predecessor_id: String,
    #[pyo3(get, set)]
    #[serde(default)]
    pub link_type: LinkType,
    /// Signed offset in work days.
    #[pyo3(get, set)]
    #[serde(default)]
    pub lag: i32,
}

impl Dependency {
    pub fn new(predecessor_id: &str, link_type: LinkType, lag: i32) -> Self {
        Self {
            predecessor_id: predecessor_id.to_string(),
            link_type,
            lag,
        }
    }

    /// Finish-to-start with no lag.
    pub fn finish_to_start(predecessor_id: &str) -> Self {
        Self::new(predecessor_id, LinkType::FinishToStart, 0)
    }
}

#[pymethods]
impl Dependency {
    #[new]
    #[pyo3(signature = (predecessor_id, link_type=LinkType::FinishToStart, lag=0))]
    fn py_new(predecessor_id: String, link_type: LinkType, lag: i32) -> Self {
        Self {
            predecessor_id,
            link_type,
            lag,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Dependency(predecessor_id={:?}, link_type={}, lag={})",
            self.predecessor_id,
            self.link_type.code(),
            self.lag
        )
    }
}

/// A schedulable task.
///
/// Everything from `start` down is calculated and overwritten on every run.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub parent_id: Option<String>,
    #[pyo3(get, set)]
    pub sort_key: String,
    #[pyo3(get, set)]
    pub name: String,
    /// Work days. For parent tasks the output holds the rolled-up span.
    #[pyo3(get, set)]
    pub duration: u32,
    #[pyo3(get, set)]
    pub constraint_type: ConstraintType,
    #[pyo3(get, set)]
    pub constraint_date: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub dependencies: Vec<Dependency>,

    #[pyo3(get)]
    pub start: Option<NaiveDate>,
    #[pyo3(get)]
    pub end: Option<NaiveDate>,
    #[pyo3(get)]
    pub late_start: Option<NaiveDate>,
    #[pyo3(get)]
    pub late_finish: Option<NaiveDate>,
    #[pyo3(get)]
    pub total_float: Option<i64>,
    #[pyo3(get)]
    pub free_float: Option<i64>,
    #[pyo3(get)]
    pub is_critical: bool,
    #[pyo3(get)]
    pub health: Option<Health>,
}

impl Task {
    pub fn new(id: &str, duration: u32) -> Self {
        Self {
            id: id.to_string(),
            parent_id: None,
            sort_key: String::new(),
            name: id.to_string(),
            duration,
            constraint_type: ConstraintType::Asap,
            constraint_date: None,
            dependencies: Vec::new(),
            start: None,
            end: None,
            late_start: None,
            late_finish: None,
            total_float: None,
            free_float: None,
            is_critical: false,
            health: None,
        }
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_constraint(mut self, constraint_type: ConstraintType, date: Option<NaiveDate>) -> Self {
        self.constraint_type = constraint_type;
        self.constraint_date = date;
        self
    }

    /// Work days between start and end: `max(duration - 1, 0)`.
    #[inline]
    pub fn duration_offset(&self) -> i64 {
        duration_offset(self.duration)
    }

    /// Reset every calculated field.
    pub fn clear_calculated(&mut self) {
        self.start = None;
        self.end = None;
        self.late_start = None;
        self.late_finish = None;
        self.total_float = None;
        self.free_float = None;
        self.is_critical = false;
        self.health = None;
    }
}

/// Work days between start and end of a task of `duration` days.
#[inline]
pub fn duration_offset(duration: u32) -> i64 {
    i64::from(duration.saturating_sub(1))
}

#[pymethods]
impl Task {
    #[new]
    #[pyo3(signature = (
        id,
        duration,
        dependencies=Vec::new(),
        parent_id=None,
        name=None,
        sort_key=String::new(),
        constraint_type=ConstraintType::Asap,
        constraint_date=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        id: String,
        duration: u32,
        dependencies: Vec<Dependency>,
        parent_id: Option<String>,
        name: Option<String>,
        sort_key: String,
        constraint_type: ConstraintType,
        constraint_date: Option<NaiveDate>,
    ) -> Self {
        let mut task = Task::new(&id, duration);
        task.name = name.unwrap_or(id);
        task.dependencies = dependencies;
        task.parent_id = parent_id;
        task.sort_key = sort_key;
        task.constraint_type = constraint_type;
        task.constraint_date = constraint_date;
        task
    }

    fn __repr__(&self) -> String {
        format!(
            "Task(id={:?}, duration={}, deps={}, start={:?}, end={:?}, health={:?})",
            self.id,
            self.duration,
            self.dependencies.len(),
            self.start,
            self.end,
            self.health
        )
    }
}

/// A hierarchy-only row (section header). Never scheduled.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Separator {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub parent_id: Option<String>,
    #[pyo3(get, set)]
    pub sort_key: String,
    #[pyo3(get, set)]
    pub name: String,
}

impl Separator {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            parent_id: None,
            sort_key: String::new(),
            name: name.to_string(),
        }
    }
}

#[pymethods]
impl Separator {
    #[new]
    #[pyo3(signature = (id, name=String::new(), parent_id=None, sort_key=String::new()))]
    fn py_new(id: String, name: String, parent_id: Option<String>, sort_key: String) -> Self {
        Self {
            id,
            parent_id,
            sort_key,
            name,
        }
    }

    fn __repr__(&self) -> String {
        format!("Separator(id={:?}, name={:?})", self.id, self.name)
    }
}

/// One row of the task hierarchy.
#[derive(Clone, Debug, PartialEq, Serialize, FromPyObject)]
#[serde(tag = "rowType", rename_all = "lowercase")]
pub enum ScheduleRow {
    Task(Task),
    Separator(Separator),
}

impl ScheduleRow {
    pub fn id(&self) -> &str {
        match self {
            ScheduleRow::Task(task) => &task.id,
            ScheduleRow::Separator(separator) => &separator.id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            ScheduleRow::Task(task) => task.parent_id.as_deref(),
            ScheduleRow::Separator(separator) => separator.parent_id.as_deref(),
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            ScheduleRow::Task(task) => Some(task),
            ScheduleRow::Separator(_) => None,
        }
    }
}

impl From<Task> for ScheduleRow {
    fn from(task: Task) -> Self {
        ScheduleRow::Task(task)
    }
}

impl From<Separator> for ScheduleRow {
    fn from(separator: Separator) -> Self {
        ScheduleRow::Separator(separator)
    }
}

impl IntoPy<PyObject> for ScheduleRow {
    fn into_py(self, py: Python<'_>) -> PyObject {
        match self {
            ScheduleRow::Task(task) => task.into_py(py),
            ScheduleRow::Separator(separator) => separator.into_py(py),
        }
    }
}
