//! Forward pass: earliest start and finish of every leaf task.

use chrono::NaiveDate;

use crate::calendar::Calendar;
use crate::config::CpmConfig;
use crate::interner::NodeId;
use crate::models::{ConstraintType, LinkType, Task};
use crate::{log_debug, log_task};

use super::index::ScheduleGraph;
use super::types::{CpmError, DateError, NodeSchedule, PassFailure, PassKind};

/// Constraint date of a task whose constraint needs one.
pub(crate) fn required_constraint_date(task: &Task) -> Result<NaiveDate, DateError> {
    task.constraint_date
        .ok_or_else(|| DateError::MissingConstraintDate {
            task_id: task.id.clone(),
            constraint: task.constraint_type,
        })
}

/// Earliest (start, end) of one leaf given the current predecessor dates.
///
/// Predecessors without dates yet (later in a non-topological order, or failed)
/// are skipped; the fixed-point loop picks them up on the next iteration.
fn schedule_leaf(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    anchor: NaiveDate,
    node: NodeId,
    schedule: &[NodeSchedule],
) -> Result<(NaiveDate, NaiveDate), DateError> {
    let task = graph.task(node);
    let offset = task.duration_offset();
    let wrap = |source| DateError::calendar(task, source);

    let mut earliest: Option<NaiveDate> = None;
    for link in &graph.predecessors[node as usize] {
        let predecessor = &schedule[link.predecessor as usize];
        let (Some(pred_start), Some(pred_end)) = (predecessor.start, predecessor.end) else {
            continue;
        };
        let candidate = match link.link_type {
            LinkType::FinishToStart => calendar.add_work_days(pred_end, 1 + link.lag),
            LinkType::StartToStart => calendar.add_work_days(pred_start, link.lag),
            LinkType::FinishToFinish => calendar.add_work_days(pred_end, link.lag - offset),
            LinkType::StartToFinish => calendar.add_work_days(pred_start, link.lag - offset),
        }
        .map_err(wrap)?;
        earliest = Some(earliest.map_or(candidate, |e| e.max(candidate)));
    }

    let mut start = earliest.unwrap_or(anchor);
    match task.constraint_type {
        ConstraintType::Snet => {
            start = start.max(required_constraint_date(task)?);
        }
        ConstraintType::Fnet => {
            let finish = required_constraint_date(task)?;
            let implied = calendar.add_work_days(finish, -offset).map_err(wrap)?;
            start = start.max(implied);
        }
        ConstraintType::Mfo => {
            // Pinned: predecessors do not move it.
            let finish = calendar
                .previous_work_day(required_constraint_date(task)?)
                .map_err(wrap)?;
            let start = calendar.add_work_days(finish, -offset).map_err(wrap)?;
            return Ok((start, finish));
        }
        ConstraintType::Asap | ConstraintType::Snlt | ConstraintType::Fnlt => {}
    }

    let start = calendar.next_work_day(start).map_err(wrap)?;
    let end = calendar.add_work_days(start, offset).map_err(wrap)?;
    Ok((start, end))
}

/// Run the forward pass to a fixed point.
///
/// Returns the number of iterations used. Fails with the unsettled leaves
/// when `config.max_iterations` is exhausted.
pub(crate) fn forward_pass(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    anchor: NaiveDate,
    config: &CpmConfig,
    schedule: &mut [NodeSchedule],
) -> Result<u32, PassFailure> {
    let verbosity = config.verbosity;
    let mut unsettled: Vec<NodeId> = Vec::new();

    for iteration in 1..=config.max_iterations {
        unsettled.clear();

        for &node in &graph.leaf_order {
            let slot = node as usize;
            if schedule[slot].date_error.is_some() {
                continue;
            }
            let before = (schedule[slot].start, schedule[slot].end);

            match schedule_leaf(graph, calendar, anchor, node, schedule) {
                Ok((start, end)) => {
                    schedule[slot].start = Some(start);
                    schedule[slot].end = Some(end);
                }
                Err(error) => {
                    log_task!(verbosity, "{}", error);
                    schedule[slot].fail(error);
                }
            }

            if (schedule[slot].start, schedule[slot].end) != before {
                unsettled.push(node);
            }
        }

        log_debug!(
            verbosity,
            "forward iteration {}: {} tasks changed",
            iteration,
            unsettled.len()
        );
        if unsettled.is_empty() {
            return Ok(iteration);
        }
    }

    Err(PassFailure {
        error: CpmError::Convergence {
            pass: PassKind::Forward,
            iterations: config.max_iterations,
            unsettled: graph.ids(&unsettled),
            cycle: graph.ids(&graph.cycle),
        },
        unsettled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dependency, ScheduleRow};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(rows: &[ScheduleRow], anchor: NaiveDate) -> (Vec<NodeSchedule>, Result<u32, PassFailure>) {
        let graph = ScheduleGraph::build(rows, 0);
        let mut schedule = vec![NodeSchedule::default(); graph.len()];
        let result = forward_pass(
            &graph,
            &Calendar::default(),
            anchor,
            &CpmConfig::default(),
            &mut schedule,
        );
        (schedule, result)
    }

    fn dates(schedule: &[NodeSchedule], node: usize) -> (NaiveDate, NaiveDate) {
        (schedule[node].start.unwrap(), schedule[node].end.unwrap())
    }

    #[test]
    fn test_unconstrained_task_starts_on_next_work_day() {
        // Anchor on a Saturday
        let rows = vec![ScheduleRow::from(Task::new("a", 2))];
        let (schedule, result) = run(&rows, date(2024, 1, 6));
        assert_eq!(result.unwrap(), 2);
        assert_eq!(dates(&schedule, 0), (date(2024, 1, 8), date(2024, 1, 9)));
    }

    #[test]
    fn test_link_types() {
        // a: Mon 1 .. Fri 5
        let rows: Vec<ScheduleRow> = vec![
            Task::new("a", 5).into(),
            Task::new("fs", 3)
                .with_dependency(Dependency::new("a", LinkType::FinishToStart, 0))
                .into(),
            Task::new("ss", 3)
                .with_dependency(Dependency::new("a", LinkType::StartToStart, 2))
                .into(),
            Task::new("ff", 3)
                .with_dependency(Dependency::new("a", LinkType::FinishToFinish, 1))
                .into(),
            Task::new("sf", 3)
                .with_dependency(Dependency::new("a", LinkType::StartToFinish, 4))
                .into(),
        ];
        let (schedule, _) = run(&rows, date(2024, 1, 1));

        assert_eq!(dates(&schedule, 0), (date(2024, 1, 1), date(2024, 1, 5)));
        assert_eq!(dates(&schedule, 1), (date(2024, 1, 8), date(2024, 1, 10)));
        assert_eq!(dates(&schedule, 2), (date(2024, 1, 3), date(2024, 1, 5)));
        // Finish one day after a's finish: Mon 8, so start Thu 4
        assert_eq!(dates(&schedule, 3), (date(2024, 1, 4), date(2024, 1, 8)));
        // Finish four days after a's start: Fri 5, so start Wed 3
        assert_eq!(dates(&schedule, 4), (date(2024, 1, 3), date(2024, 1, 5)));
    }

    #[test]
    fn test_latest_predecessor_wins() {
        let rows: Vec<ScheduleRow> = vec![
            Task::new("short", 1).into(),
            Task::new("long", 4).into(),
            Task::new("join", 1)
                .with_dependency(Dependency::finish_to_start("short"))
                .with_dependency(Dependency::finish_to_start("long"))
                .into(),
        ];
        let (schedule, _) = run(&rows, date(2024, 1, 1));
        assert_eq!(dates(&schedule, 2), (date(2024, 1, 5), date(2024, 1, 5)));
    }

    #[test]
    fn test_constraints() {
        let rows: Vec<ScheduleRow> = vec![
            Task::new("snet", 2)
                .with_constraint(ConstraintType::Snet, Some(date(2024, 1, 10)))
                .into(),
            Task::new("fnet", 3)
                .with_constraint(ConstraintType::Fnet, Some(date(2024, 1, 12)))
                .into(),
            Task::new("mfo", 2)
                .with_constraint(ConstraintType::Mfo, Some(date(2024, 1, 3)))
                .into(),
            Task::new("fnlt", 2)
                .with_constraint(ConstraintType::Fnlt, Some(date(2024, 1, 1)))
                .into(),
        ];
        let (schedule, _) = run(&rows, date(2024, 1, 1));
        assert_eq!(dates(&schedule, 0), (date(2024, 1, 10), date(2024, 1, 11)));
        assert_eq!(dates(&schedule, 1), (date(2024, 1, 10), date(2024, 1, 12)));
        assert_eq!(dates(&schedule, 2), (date(2024, 1, 2), date(2024, 1, 3)));
        // Deadlines do not move the task.
        assert_eq!(dates(&schedule, 3), (date(2024, 1, 1), date(2024, 1, 2)));
    }

    #[test]
    fn test_mfo_overrides_predecessors() {
        let rows: Vec<ScheduleRow> = vec![
            Task::new("a", 5).into(),
            Task::new("b", 1)
                .with_dependency(Dependency::finish_to_start("a"))
                .with_constraint(ConstraintType::Mfo, Some(date(2024, 1, 2)))
                .into(),
        ];
        let (schedule, _) = run(&rows, date(2024, 1, 1));
        assert_eq!(dates(&schedule, 1), (date(2024, 1, 2), date(2024, 1, 2)));
    }

    #[test]
    fn test_finish_to_finish_can_start_before_anchor() {
        // b must finish with a on Mon 1, so its 10 days begin in December.
        let rows: Vec<ScheduleRow> = vec![
            Task::new("a", 1).into(),
            Task::new("b", 10)
                .with_dependency(Dependency::new("a", LinkType::FinishToFinish, 0))
                .into(),
        ];
        let (schedule, result) = run(&rows, date(2024, 1, 1));
        assert!(result.is_ok());
        assert_eq!(dates(&schedule, 1), (date(2023, 12, 19), date(2024, 1, 1)));
    }

    #[test]
    fn test_missing_constraint_date_is_task_scoped() {
        let rows: Vec<ScheduleRow> = vec![
            Task::new("bad", 2)
                .with_constraint(ConstraintType::Snet, None)
                .into(),
            Task::new("good", 2).into(),
        ];
        let (schedule, result) = run(&rows, date(2024, 1, 1));
        assert!(result.is_ok());
        assert_eq!(schedule[0].start, None);
        assert!(matches!(
            schedule[0].date_error,
            Some(DateError::MissingConstraintDate { .. })
        ));
        assert_eq!(dates(&schedule, 1), (date(2024, 1, 1), date(2024, 1, 2)));
    }

    #[test]
    fn test_cycle_hits_iteration_cap() {
        let rows: Vec<ScheduleRow> = vec![
            Task::new("a", 1)
                .with_dependency(Dependency::finish_to_start("b"))
                .into(),
            Task::new("b", 1)
                .with_dependency(Dependency::finish_to_start("a"))
                .into(),
        ];
        let (_, result) = run(&rows, date(2024, 1, 1));
        let failure = result.unwrap_err();
        assert_eq!(failure.unsettled.len(), 2);
        match failure.error {
            CpmError::Convergence {
                pass,
                iterations,
                cycle,
                ..
            } => {
                assert_eq!(pass, PassKind::Forward);
                assert_eq!(iterations, 50);
                assert_eq!(cycle, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_mutual_start_to_start_converges() {
        let rows: Vec<ScheduleRow> = vec![
            Task::new("a", 2)
                .with_dependency(Dependency::new("b", LinkType::StartToStart, 0))
                .into(),
            Task::new("b", 3)
                .with_dependency(Dependency::new("a", LinkType::StartToStart, 0))
                .into(),
        ];
        let (schedule, result) = run(&rows, date(2024, 1, 1));
        assert!(result.is_ok());
        assert_eq!(schedule[0].start, schedule[1].start);
    }
}
