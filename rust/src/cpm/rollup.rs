//! Summary-task rollup: parents derive their dates from direct children.
//!
//! Parents are visited deepest first, so a child summary is final before its
//! own parent reads it.

use chrono::NaiveDate;

use crate::calendar::Calendar;

use super::index::ScheduleGraph;
use super::types::NodeSchedule;

fn min_date(acc: Option<NaiveDate>, value: Option<NaiveDate>) -> Option<NaiveDate> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a.min(v)),
        (a, v) => a.or(v),
    }
}

fn max_date(acc: Option<NaiveDate>, value: Option<NaiveDate>) -> Option<NaiveDate> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a.max(v)),
        (a, v) => a.or(v),
    }
}

/// start = min(children.start), end = max(children.end), span in work days.
///
/// A parent with no dated child keeps its dates unset.
pub(crate) fn rollup_dates(graph: &ScheduleGraph<'_>, calendar: &Calendar, schedule: &mut [NodeSchedule]) {
    for &parent in &graph.parents_by_depth {
        let mut start = None;
        let mut end = None;
        for &child in &graph.children[parent as usize] {
            let child = &schedule[child as usize];
            start = min_date(start, child.start);
            end = max_date(end, child.end);
        }

        let node = &mut schedule[parent as usize];
        node.start = start;
        node.end = end;
        node.span = match (start, end) {
            (Some(start), Some(end)) => {
                Some((calendar.work_days_between(start, end) + 1).max(0) as u32)
            }
            _ => None,
        };
    }
}

/// lateStart = min(children.lateStart), lateFinish = max(children.lateFinish).
pub(crate) fn rollup_late_dates(graph: &ScheduleGraph<'_>, schedule: &mut [NodeSchedule]) {
    for &parent in &graph.parents_by_depth {
        let mut late_start = None;
        let mut late_finish = None;
        for &child in &graph.children[parent as usize] {
            let child = &schedule[child as usize];
            late_start = min_date(late_start, child.late_start);
            late_finish = max_date(late_finish, child.late_finish);
        }

        let node = &mut schedule[parent as usize];
        node.late_start = late_start;
        node.late_finish = late_finish;
    }
}
