//! Health classification.
//!
//! Rules, first match wins:
//! 1. Blocked: a dependency cannot be resolved, the task has no dates, or it
//!    was still moving when a pass hit its iteration cap
//! 2. Critical failure: deadline missed by more than `critical_failure_days`,
//!    or negative total float
//! 3. At risk: deadline missed by 1..=`critical_failure_days`, or critical with
//!    total float under `at_risk_float_days`
//! 4. Healthy
//!
//! Parents take the most severe health among their direct children.

use crate::calendar::Calendar;
use crate::config::CpmConfig;
use crate::interner::NodeId;
use crate::models::{ConstraintType, Health, Task};

use super::index::ScheduleGraph;
use super::types::NodeSchedule;

/// Work days by which a FNLT/SNLT deadline is missed (negative when met early).
fn deadline_violation(task: &Task, node: &NodeSchedule, calendar: &Calendar) -> Option<i64> {
    let deadline = task.constraint_date?;
    match task.constraint_type {
        ConstraintType::Fnlt => node
            .end
            .map(|end| calendar.work_days_between(deadline, end)),
        ConstraintType::Snlt => node
            .start
            .map(|start| calendar.work_days_between(deadline, start)),
        ConstraintType::Asap | ConstraintType::Snet | ConstraintType::Fnet | ConstraintType::Mfo => {
            None
        }
    }
}

fn is_blocked(graph: &ScheduleGraph<'_>, schedule: &[NodeSchedule], node: NodeId) -> bool {
    let current = &schedule[node as usize];
    current.date_error.is_some()
        || current.start.is_none()
        || graph.unresolved[node as usize]
        || graph.predecessors[node as usize]
            .iter()
            .any(|link| schedule[link.predecessor as usize].start.is_none())
}

fn classify_leaf(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    config: &CpmConfig,
    schedule: &[NodeSchedule],
    node: NodeId,
) -> Health {
    if is_blocked(graph, schedule, node) {
        return Health::Blocked;
    }

    let current = &schedule[node as usize];
    let violation = deadline_violation(graph.task(node), current, calendar).unwrap_or(0);
    let float = current.total_float;

    if violation > config.critical_failure_days || float.is_some_and(|f| f < 0) {
        Health::CriticalFailure
    } else if violation >= 1
        || (current.is_critical && float.is_some_and(|f| f < config.at_risk_float_days))
    {
        Health::AtRisk
    } else {
        Health::Healthy
    }
}

fn rollup_health(graph: &ScheduleGraph<'_>, schedule: &mut [NodeSchedule]) {
    for &parent in &graph.parents_by_depth {
        let worst = graph.children[parent as usize]
            .iter()
            .filter_map(|&child| schedule[child as usize].health)
            .reduce(Health::worst);
        schedule[parent as usize].health = worst;
    }
}

/// Classify every leaf, then roll health up to parents.
pub(crate) fn analyze_health(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    config: &CpmConfig,
    schedule: &mut [NodeSchedule],
) {
    for &node in &graph.leaf_order {
        let health = classify_leaf(graph, calendar, config, schedule, node);
        schedule[node as usize].health = Some(health);
    }
    rollup_health(graph, schedule);
}

/// After a failed run: leaves that never settled are Blocked, the rest are
/// left unclassified.
pub(crate) fn mark_blocked(graph: &ScheduleGraph<'_>, schedule: &mut [NodeSchedule], nodes: &[NodeId]) {
    for &node in nodes {
        schedule[node as usize].health = Some(Health::Blocked);
    }
    rollup_health(graph, schedule);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::models::{Dependency, ScheduleRow};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dated(start: NaiveDate, end: NaiveDate, float: i64) -> NodeSchedule {
        NodeSchedule {
            start: Some(start),
            end: Some(end),
            total_float: Some(float),
            is_critical: float <= 0,
            ..Default::default()
        }
    }

    fn classify(rows: &[ScheduleRow], schedule: &[NodeSchedule], node: NodeId) -> Health {
        let graph = ScheduleGraph::build(rows, 0);
        classify_leaf(
            &graph,
            &Calendar::default(),
            &CpmConfig::default(),
            schedule,
            node,
        )
    }

    #[test]
    fn test_fnlt_thresholds() {
        // Early finish Fri Jan 12
        let node = dated(date(2024, 1, 1), date(2024, 1, 12), 3);
        let with_deadline = |deadline| {
            vec![ScheduleRow::from(
                Task::new("a", 10).with_constraint(ConstraintType::Fnlt, Some(deadline)),
            )]
        };

        let missed_by_five = with_deadline(date(2024, 1, 5));
        assert_eq!(classify(&missed_by_five, &[node.clone()], 0), Health::CriticalFailure);

        let missed_by_three = with_deadline(date(2024, 1, 9));
        assert_eq!(classify(&missed_by_three, &[node.clone()], 0), Health::AtRisk);

        let missed_by_two = with_deadline(date(2024, 1, 10));
        assert_eq!(classify(&missed_by_two, &[node.clone()], 0), Health::AtRisk);

        let met = with_deadline(date(2024, 1, 12));
        assert_eq!(classify(&met, &[node], 0), Health::Healthy);
    }

    #[test]
    fn test_snlt_violation() {
        let node = dated(date(2024, 1, 8), date(2024, 1, 8), 5);
        let rows = vec![ScheduleRow::from(
            Task::new("a", 1).with_constraint(ConstraintType::Snlt, Some(date(2024, 1, 5))),
        )];
        assert_eq!(classify(&rows, &[node], 0), Health::AtRisk);
    }

    #[test]
    fn test_float_rules() {
        let rows = vec![ScheduleRow::from(Task::new("a", 1))];
        let day = date(2024, 1, 1);
        assert_eq!(classify(&rows, &[dated(day, day, -1)], 0), Health::CriticalFailure);
        assert_eq!(classify(&rows, &[dated(day, day, 0)], 0), Health::AtRisk);
        assert_eq!(classify(&rows, &[dated(day, day, 1)], 0), Health::Healthy);
    }

    #[test]
    fn test_blocked_rules() {
        let day = date(2024, 1, 1);
        let rows: Vec<ScheduleRow> = vec![
            Task::new("a", 1).into(),
            Task::new("b", 1)
                .with_dependency(Dependency::finish_to_start("a"))
                .into(),
            Task::new("c", 1)
                .with_dependency(Dependency::finish_to_start("ghost"))
                .into(),
        ];
        // a has no dates (e.g. a date error), so b is blocked by it.
        let schedule = vec![
            NodeSchedule::default(),
            dated(day, day, 0),
            dated(day, day, 0),
        ];
        assert_eq!(classify(&rows, &schedule, 0), Health::Blocked);
        assert_eq!(classify(&rows, &schedule, 1), Health::Blocked);
        assert_eq!(classify(&rows, &schedule, 2), Health::Blocked);
    }

    #[test]
    fn test_parent_takes_worst_child() {
        let day = date(2024, 1, 1);
        let rows: Vec<ScheduleRow> = vec![
            Task::new("p", 0).into(),
            Task::new("ok", 1).with_parent("p").into(),
            Task::new("bad", 1).with_parent("p").into(),
        ];
        let graph = ScheduleGraph::build(&rows, 0);
        let mut schedule = vec![NodeSchedule::default(), dated(day, day, 5), dated(day, day, -1)];
        analyze_health(&graph, &Calendar::default(), &CpmConfig::default(), &mut schedule);
        assert_eq!(schedule[1].health, Some(Health::Healthy));
        assert_eq!(schedule[2].health, Some(Health::CriticalFailure));
        assert_eq!(schedule[0].health, Some(Health::CriticalFailure));
    }

    #[test]
    fn test_mark_blocked() {
        let rows: Vec<ScheduleRow> = vec![
            Task::new("p", 0).into(),
            Task::new("a", 1).with_parent("p").into(),
            Task::new("b", 1).into(),
        ];
        let graph = ScheduleGraph::build(&rows, 0);
        let mut schedule = vec![NodeSchedule::default(); graph.len()];
        mark_blocked(&graph, &mut schedule, &[1]);
        assert_eq!(schedule[1].health, Some(Health::Blocked));
        assert_eq!(schedule[0].health, Some(Health::Blocked));
        assert_eq!(schedule[2].health, None);
    }
}
