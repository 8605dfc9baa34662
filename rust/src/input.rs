//! JSON input boundary.
//!
//! Accepts the host application's project payload and normalizes it into
//! engine types. Calendar exceptions come in two shapes, a bare string marker
//! (non-working, the string is its label) or a `{working, label}` record; both
//! end up as one `CalendarException`.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::calendar::{parse_date, Calendar, CalendarError, CalendarException};
use crate::config::CpmConfig;
use crate::cpm::{calculate_with_date_errors, CpmResult, DateError};
use crate::models::{ConstraintType, Dependency, ScheduleRow, Separator, Task};

/// Failures that reject the whole payload.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("invalid project JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid calendar exception date {value:?}: {source}")]
    ExceptionDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("invalid project anchor {value:?}: {source}")]
    AnchorDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Top-level payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub tasks: Vec<RowRecord>,
    #[serde(default)]
    pub calendar: Option<CalendarRecord>,
    /// `YYYY-MM-DD`; defaults to today.
    #[serde(default)]
    pub project_anchor: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    #[default]
    Task,
    Separator,
}

/// One row as the host stores it. Calculated fields, if present, are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRecord {
    pub id: String,
    #[serde(default)]
    pub row_type: RowKind,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub sort_key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub constraint_type: ConstraintType,
    #[serde(default)]
    pub constraint_date: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

fn default_working_days() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarRecord {
    /// Weekday indices, 0 = Sunday.
    #[serde(default = "default_working_days")]
    pub working_days: Vec<u8>,
    /// Keyed by `YYYY-MM-DD`.
    #[serde(default)]
    pub exceptions: BTreeMap<String, ExceptionRecord>,
}

impl Default for CalendarRecord {
    fn default() -> Self {
        Self {
            working_days: default_working_days(),
            exceptions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExceptionRecord {
    Marker(String),
    Detailed {
        #[serde(default)]
        working: bool,
        #[serde(default)]
        label: Option<String>,
    },
}

impl From<ExceptionRecord> for CalendarException {
    fn from(record: ExceptionRecord) -> Self {
        match record {
            ExceptionRecord::Marker(label) => CalendarException::holiday(Some(label)),
            ExceptionRecord::Detailed { working, label } => CalendarException { working, label },
        }
    }
}

impl CalendarRecord {
    pub fn into_calendar(self) -> Result<Calendar, InputError> {
        let mut calendar = Calendar::from_weekday_indices(&self.working_days)?;
        for (key, record) in self.exceptions {
            let date = parse_date(&key).map_err(|source| InputError::ExceptionDate {
                value: key.clone(),
                source,
            })?;
            calendar.set_exception(date, record.into());
        }
        Ok(calendar)
    }
}

impl RowRecord {
    /// Convert to an engine row. A malformed constraint date is dropped and
    /// reported instead of rejecting the payload.
    fn into_row(self) -> (ScheduleRow, Option<DateError>) {
        let name = self.name.unwrap_or_else(|| self.id.clone());
        match self.row_type {
            RowKind::Separator => {
                let mut separator = Separator::new(&self.id, &name);
                separator.parent_id = self.parent_id;
                separator.sort_key = self.sort_key;
                (separator.into(), None)
            }
            RowKind::Task => {
                let (constraint_date, error) = match self.constraint_date.as_deref() {
                    None | Some("") => (None, None),
                    Some(value) => match parse_date(value) {
                        Ok(date) => (Some(date), None),
                        Err(_) => (
                            None,
                            Some(DateError::Malformed {
                                task_id: self.id.clone(),
                                value: value.to_string(),
                            }),
                        ),
                    },
                };
                let mut task = Task::new(&self.id, self.duration)
                    .with_constraint(self.constraint_type, constraint_date);
                task.name = name;
                task.parent_id = self.parent_id;
                task.sort_key = self.sort_key;
                task.dependencies = self.dependencies;
                (task.into(), error)
            }
        }
    }
}

/// A payload normalized into engine inputs.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub rows: Vec<ScheduleRow>,
    pub calendar: Calendar,
    pub project_anchor: Option<NaiveDate>,
    /// Dates dropped while loading.
    pub date_errors: Vec<DateError>,
}

impl LoadedProject {
    /// Run the engine, anchoring at today when the payload has no anchor.
    pub fn calculate(&self, config: &CpmConfig) -> CpmResult {
        let anchor = self
            .project_anchor
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        calculate_with_date_errors(&self.rows, &self.calendar, anchor, config, &self.date_errors)
    }
}

impl TryFrom<ProjectRecord> for LoadedProject {
    type Error = InputError;

    fn try_from(record: ProjectRecord) -> Result<Self, Self::Error> {
        let calendar = record.calendar.unwrap_or_default().into_calendar()?;
        let project_anchor = record
            .project_anchor
            .map(|value| {
                parse_date(&value).map_err(|source| InputError::AnchorDate { value, source })
            })
            .transpose()?;

        let mut rows = Vec::with_capacity(record.tasks.len());
        let mut date_errors = Vec::new();
        for row in record.tasks {
            let (row, error) = row.into_row();
            rows.push(row);
            date_errors.extend(error);
        }

        Ok(Self {
            rows,
            calendar,
            project_anchor,
            date_errors,
        })
    }
}

/// Parse and normalize a project payload.
pub fn load_project(json: &str) -> Result<LoadedProject, InputError> {
    let record: ProjectRecord = serde_json::from_str(json)?;
    LoadedProject::try_from(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::CalcState;
    use crate::models::{Health, LinkType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const PAYLOAD: &str = r#"{
        "projectAnchor": "2024-01-01",
        "calendar": {
            "workingDays": [1, 2, 3, 4, 5],
            "exceptions": {
                "2024-01-03": "Company day",
                "2024-01-06": {"working": true, "label": "Saturday shift"},
                "2024-01-08": {"working": false}
            }
        },
        "tasks": [
            {"id": "s1", "rowType": "separator", "name": "Phase 1"},
            {"id": "a", "parentId": "s1", "duration": 3},
            {"id": "b", "duration": 2,
             "dependencies": [{"predecessorId": "a", "linkType": "SS", "lag": 1}]},
            {"id": "c", "duration": 1, "constraintType": "SNET", "constraintDate": "2024-01-15"}
        ]
    }"#;

    #[test]
    fn test_load_project() {
        let project = load_project(PAYLOAD).unwrap();

        assert_eq!(project.project_anchor, Some(date(2024, 1, 1)));
        assert_eq!(project.rows.len(), 4);
        assert!(matches!(project.rows[0], ScheduleRow::Separator(_)));
        let b = project.rows[2].as_task().unwrap();
        assert_eq!(b.name, "b");
        assert_eq!(
            b.dependencies,
            vec![Dependency::new("a", LinkType::StartToStart, 1)]
        );
        let c = project.rows[3].as_task().unwrap();
        assert_eq!(c.constraint_type, ConstraintType::Snet);
        assert_eq!(c.constraint_date, Some(date(2024, 1, 15)));
        assert!(project.date_errors.is_empty());
    }

    #[test]
    fn test_exception_shapes_normalize() {
        let calendar = load_project(PAYLOAD).unwrap().calendar;
        assert_eq!(
            calendar.exception(date(2024, 1, 3)),
            Some(&CalendarException::holiday(Some("Company day".to_string())))
        );
        assert!(calendar.is_work_day(date(2024, 1, 6)));
        assert!(!calendar.is_work_day(date(2024, 1, 8)));
        assert_eq!(calendar.exception(date(2024, 1, 8)).unwrap().label, None);
    }

    #[test]
    fn test_loaded_project_calculates() {
        let result = load_project(PAYLOAD).unwrap().calculate(&CpmConfig::default());
        assert_eq!(result.state, CalcState::Done);

        // Wed 3 is off, Sat 6 is on: a runs Mon 1, Tue 2, Thu 4.
        let a = result.task("a").unwrap();
        assert_eq!((a.start, a.end), (Some(date(2024, 1, 1)), Some(date(2024, 1, 4))));
        // SS +1 from Mon 1 is Tue 2.
        assert_eq!(result.task("b").unwrap().start, Some(date(2024, 1, 2)));
        assert_eq!(result.task("c").unwrap().start, Some(date(2024, 1, 15)));
    }

    #[test]
    fn test_malformed_constraint_date_is_reported() {
        let json = r#"{
            "projectAnchor": "2024-01-01",
            "tasks": [{"id": "a", "duration": 2, "constraintType": "SNET", "constraintDate": "soon"}]
        }"#;
        let project = load_project(json).unwrap();
        assert_eq!(
            project.date_errors,
            vec![DateError::Malformed {
                task_id: "a".to_string(),
                value: "soon".to_string(),
            }]
        );

        let result = project.calculate(&CpmConfig::default());
        assert_eq!(result.stats.date_errors, project.date_errors);
        assert_eq!(result.task("a").unwrap().health, Some(Health::Blocked));
    }

    #[test]
    fn test_malformed_deadline_blocks_task_and_successors() {
        let json = r#"{
            "projectAnchor": "2024-01-01",
            "tasks": [
                {"id": "a", "duration": 10, "constraintType": "FNLT", "constraintDate": "2024-13-45"},
                {"id": "b", "duration": 2, "dependencies": [{"predecessorId": "a"}]},
                {"id": "c", "duration": 1}
            ]
        }"#;
        let result = load_project(json).unwrap().calculate(&CpmConfig::default());

        assert_eq!(result.state, CalcState::Done);
        let a = result.task("a").unwrap();
        assert_eq!((a.start, a.end), (None, None));
        assert_eq!(a.total_float, None);
        assert_eq!(a.health, Some(Health::Blocked));
        assert_eq!(result.task("b").unwrap().health, Some(Health::Blocked));
        assert_eq!(result.task("c").unwrap().start, Some(date(2024, 1, 1)));
        assert_eq!(
            result.stats.date_errors,
            vec![DateError::Malformed {
                task_id: "a".to_string(),
                value: "2024-13-45".to_string(),
            }]
        );
    }

    #[test]
    fn test_rejects_bad_payloads() {
        assert!(matches!(load_project("{"), Err(InputError::Json(_))));
        assert!(matches!(
            load_project(r#"{"tasks": [], "projectAnchor": "01/02/2024"}"#),
            Err(InputError::AnchorDate { .. })
        ));
        assert!(matches!(
            load_project(r#"{"tasks": [], "calendar": {"exceptions": {"tomorrow": "x"}}}"#),
            Err(InputError::ExceptionDate { .. })
        ));
        assert!(matches!(
            load_project(r#"{"tasks": [], "calendar": {"workingDays": [7]}}"#),
            Err(InputError::Calendar(CalendarError::InvalidWeekday(7)))
        ));
    }

    #[test]
    fn test_output_json_loads_back() {
        let project = load_project(PAYLOAD).unwrap();
        let first = project.calculate(&CpmConfig::default());

        let mut value: serde_json::Value = serde_json::from_str(&first.to_json().unwrap()).unwrap();
        value["projectAnchor"] = serde_json::json!("2024-01-01");
        let reloaded = load_project(&value.to_string()).unwrap();
        let second = LoadedProject {
            calendar: project.calendar.clone(),
            ..reloaded
        }
        .calculate(&CpmConfig::default());

        assert_eq!(first.tasks, second.tasks);
    }
}
