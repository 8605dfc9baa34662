//! Work calendar: working weekdays, dated exceptions and work-day arithmetic.
//!
//! Every date in the engine is a `NaiveDate`. There is no time-of-day or
//! timezone component, so a weekday lookup can never drift by a day.
//!
//! # Precedence
//! An exception for a date always wins over the weekday rule:
//! - non-working exception (holiday) forces a non-work day
//! - working exception (e.g. a Saturday shift) forces a work day
//! - otherwise the weekday must be in the working set

use chrono::{Datelike, Days, NaiveDate, Weekday};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Longest run of consecutive non-work days a scan will cross before giving up.
const MAX_NON_WORK_RUN: u32 = 3660;

/// Date format used by calendar exception keys and the JSON boundary.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors from calendar arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("date arithmetic out of range at {0}")]
    OutOfRange(NaiveDate),
    #[error("no working day within 3660 days of {0}")]
    NoWorkingDays(NaiveDate),
    #[error("invalid weekday index {0} (expected 0=Sunday .. 6=Saturday)")]
    InvalidWeekday(u8),
}

/// Parse a `YYYY-MM-DD` date string.
pub fn parse_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
}

/// Override of the weekday rule for a single date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarException {
    pub working: bool,
    pub label: Option<String>,
}

impl CalendarException {
    pub fn holiday(label: Option<String>) -> Self {
        Self {
            working: false,
            label,
        }
    }

    pub fn working_day(label: Option<String>) -> Self {
        Self {
            working: true,
            label,
        }
    }
}

/// Working-day rules for a project.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Calendar {
    /// Indexed by `Weekday::num_days_from_sunday()`.
    working_days: [bool; 7],
    exceptions: FxHashMap<NaiveDate, CalendarException>,
}

impl Default for Calendar {
    /// Monday to Friday, no exceptions.
    fn default() -> Self {
        Self::new([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ])
    }
}

impl Calendar {
    /// Create a calendar working on the given weekdays.
    pub fn new(working_days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut days = [false; 7];
        for day in working_days {
            days[day.num_days_from_sunday() as usize] = true;
        }
        Self {
            working_days: days,
            exceptions: FxHashMap::default(),
        }
    }

    /// Create a calendar from weekday indices (0 = Sunday .. 6 = Saturday).
    pub fn from_weekday_indices(indices: &[u8]) -> Result<Self, CalendarError> {
        let mut days = [false; 7];
        for &index in indices {
            let slot = days
                .get_mut(index as usize)
                .ok_or(CalendarError::InvalidWeekday(index))?;
            *slot = true;
        }
        Ok(Self {
            working_days: days,
            exceptions: FxHashMap::default(),
        })
    }

    /// Add an exception, replacing any previous one for the same date.
    pub fn with_exception(mut self, date: NaiveDate, exception: CalendarException) -> Self {
        self.set_exception(date, exception);
        self
    }

    /// Add a non-working day.
    pub fn with_holiday(self, date: NaiveDate, label: &str) -> Self {
        self.with_exception(date, CalendarException::holiday(Some(label.to_string())))
    }

    pub fn set_exception(&mut self, date: NaiveDate, exception: CalendarException) {
        self.exceptions.insert(date, exception);
    }

    pub fn exception(&self, date: NaiveDate) -> Option<&CalendarException> {
        self.exceptions.get(&date)
    }

    /// Weekday indices (0 = Sunday) that are working by default.
    pub fn working_weekday_indices(&self) -> Vec<u8> {
        (0u8..7)
            .filter(|&i| self.working_days[i as usize])
            .collect()
    }

    /// Whether any date can ever be a work day.
    pub fn has_working_days(&self) -> bool {
        self.working_days.iter().any(|&w| w) || self.exceptions.values().any(|e| e.working)
    }

    #[inline]
    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        match self.exceptions.get(&date) {
            Some(exception) => exception.working,
            None => self.working_days[date.weekday().num_days_from_sunday() as usize],
        }
    }

    /// Move `n` work days away from `date` (backward when `n < 0`).
    ///
    /// The starting date itself is never counted. `n = 0` returns `date`
    /// unchanged, even when it is not a work day.
    pub fn add_work_days(&self, date: NaiveDate, n: i64) -> Result<NaiveDate, CalendarError> {
        let forward = n > 0;
        let mut remaining = n.unsigned_abs();
        let mut current = date;
        let mut idle = 0u32;

        while remaining > 0 {
            current = step(current, forward)?;
            if self.is_work_day(current) {
                remaining -= 1;
                idle = 0;
            } else {
                idle += 1;
                if idle > MAX_NON_WORK_RUN {
                    return Err(CalendarError::NoWorkingDays(date));
                }
            }
        }

        Ok(current)
    }

    /// `date` if it is a work day, otherwise the next work day after it.
    pub fn next_work_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        if self.is_work_day(date) {
            Ok(date)
        } else {
            self.add_work_days(date, 1)
        }
    }

    /// `date` if it is a work day, otherwise the closest work day before it.
    pub fn previous_work_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        if self.is_work_day(date) {
            Ok(date)
        } else {
            self.add_work_days(date, -1)
        }
    }

    /// Signed number of work-day steps from `a` to `b`.
    ///
    /// Counts work days in `(a, b]` when `b >= a`, and minus the work days in
    /// `[b, a)` otherwise, so that `work_days_between(a, add_work_days(a, k)) == k`
    /// whenever `a` is a work day.
    pub fn work_days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        if b >= a {
            a.iter_days()
                .skip(1)
                .take_while(|d| *d <= b)
                .filter(|d| self.is_work_day(*d))
                .count() as i64
        } else {
            -(b.iter_days()
                .take_while(|d| *d < a)
                .filter(|d| self.is_work_day(*d))
                .count() as i64)
        }
    }
}

fn step(date: NaiveDate, forward: bool) -> Result<NaiveDate, CalendarError> {
    let next = if forward {
        date.checked_add_days(Days::new(1))
    } else {
        date.checked_sub_days(Days::new(1))
    };
    next.ok_or(CalendarError::OutOfRange(date))
}

/// Accept either a bare marker (a label string, meaning non-working) or a
/// `{"working": bool, "label": str}` mapping.
fn extract_exception(value: &Bound<'_, PyAny>) -> PyResult<CalendarException> {
    if let Ok(label) = value.extract::<String>() {
        return Ok(CalendarException::holiday(Some(label)));
    }
    if let Ok(record) = value.downcast::<PyDict>() {
        let working = match record.get_item("working")? {
            Some(flag) => flag.extract::<bool>()?,
            None => false,
        };
        let label = match record.get_item("label")? {
            Some(label) if !label.is_none() => Some(label.extract::<String>()?),
            _ => None,
        };
        return Ok(CalendarException { working, label });
    }
    Err(PyValueError::new_err(format!(
        "unsupported calendar exception value: {}",
        value.repr()?
    )))
}

#[pymethods]
impl Calendar {
    #[new]
    #[pyo3(signature = (working_days=vec![1, 2, 3, 4, 5], exceptions=None))]
    fn py_new(working_days: Vec<u8>, exceptions: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let mut calendar = Calendar::from_weekday_indices(&working_days)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        if let Some(exceptions) = exceptions {
            for (key, value) in exceptions.iter() {
                let key: String = key.extract()?;
                let date = parse_date(&key).map_err(|e| {
                    PyValueError::new_err(format!("invalid exception date {:?}: {}", key, e))
                })?;
                calendar.set_exception(date, extract_exception(&value)?);
            }
        }
        Ok(calendar)
    }

    #[pyo3(name = "is_work_day")]
    fn py_is_work_day(&self, date: NaiveDate) -> bool {
        self.is_work_day(date)
    }

    #[pyo3(name = "add_work_days")]
    fn py_add_work_days(&self, date: NaiveDate, n: i64) -> PyResult<NaiveDate> {
        self.add_work_days(date, n)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    #[pyo3(name = "work_days_between")]
    fn py_work_days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        self.work_days_between(a, b)
    }

    fn __repr__(&self) -> String {
        format!(
            "Calendar(working_days={:?}, exceptions={})",
            self.working_weekday_indices(),
            self.exceptions.len()
        )
    }
}
