//! Backward pass: latest allowable start and finish of every leaf task.
//!
//! Mirror image of the forward pass. Each link formula inverts the forward
//! formula for the same link type, so a chain of zero-float tasks lands on
//! exactly the dates the forward pass produced.

use chrono::NaiveDate;

use crate::calendar::Calendar;
use crate::config::CpmConfig;
use crate::interner::NodeId;
use crate::models::{duration_offset, ConstraintType, LinkType};
use crate::{log_debug, log_task};

use super::index::ScheduleGraph;
use super::types::{CpmError, DateError, NodeSchedule, PassFailure, PassKind};

/// Latest (late_start, late_finish) of one leaf given its successors' late dates.
fn late_dates(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    config: &CpmConfig,
    project_end: NaiveDate,
    node: NodeId,
    schedule: &[NodeSchedule],
) -> Result<(NaiveDate, NaiveDate), DateError> {
    let task = graph.task(node);
    let offset = task.duration_offset();
    let wrap = |source| DateError::calendar(task, source);

    let mut latest: Option<NaiveDate> = None;
    for link in &graph.successors[node as usize] {
        let Some(succ_late_start) = schedule[link.successor as usize].late_start else {
            continue;
        };
        let succ_offset = duration_offset(link.successor_duration);
        let candidate = match link.link_type {
            LinkType::FinishToStart => calendar.add_work_days(succ_late_start, -(1 + link.lag)),
            LinkType::StartToStart => calendar
                .add_work_days(succ_late_start, -link.lag)
                .and_then(|start| calendar.add_work_days(start, offset)),
            LinkType::FinishToFinish => {
                calendar.add_work_days(succ_late_start, succ_offset - link.lag)
            }
            LinkType::StartToFinish => calendar
                .add_work_days(succ_late_start, succ_offset - link.lag)
                .and_then(|start| calendar.add_work_days(start, offset)),
        }
        .map_err(wrap)?;
        latest = Some(latest.map_or(candidate, |l| l.min(candidate)));
    }

    let mut finish = latest.unwrap_or(project_end);
    match (task.constraint_type, task.constraint_date) {
        (ConstraintType::Mfo, Some(date)) => finish = finish.min(date),
        (ConstraintType::Fnlt, Some(date)) if config.deadlines_tighten_late_dates => {
            finish = finish.min(date);
        }
        (ConstraintType::Snlt, Some(date)) if config.deadlines_tighten_late_dates => {
            finish = finish.min(calendar.add_work_days(date, offset).map_err(wrap)?);
        }
        _ => {}
    }

    let finish = calendar.previous_work_day(finish).map_err(wrap)?;
    let start = calendar.add_work_days(finish, -offset).map_err(wrap)?;
    Ok((start, finish))
}

/// Run the backward pass to a fixed point, visiting leaves in reverse
/// topological order. Leaves without early dates are skipped.
pub(crate) fn backward_pass(
    graph: &ScheduleGraph<'_>,
    calendar: &Calendar,
    config: &CpmConfig,
    project_end: NaiveDate,
    schedule: &mut [NodeSchedule],
) -> Result<u32, PassFailure> {
    let verbosity = config.verbosity;
    let mut unsettled: Vec<NodeId> = Vec::new();

    for iteration in 1..=config.max_iterations {
        unsettled.clear();

        for &node in graph.leaf_order.iter().rev() {
            let slot = node as usize;
            if schedule[slot].start.is_none() {
                continue;
            }
            let before = (schedule[slot].late_start, schedule[slot].late_finish);

            match late_dates(graph, calendar, config, project_end, node, schedule) {
                Ok((late_start, late_finish)) => {
                    schedule[slot].late_start = Some(late_start);
                    schedule[slot].late_finish = Some(late_finish);
                }
                Err(error) => {
                    log_task!(verbosity, "{}", error);
                    schedule[slot].fail(error);
                }
            }

            if (schedule[slot].late_start, schedule[slot].late_finish) != before {
                unsettled.push(node);
            }
        }

        log_debug!(
            verbosity,
            "backward iteration {}: {} tasks changed",
            iteration,
            unsettled.len()
        );
        if unsettled.is_empty() {
            return Ok(iteration);
        }
    }

    Err(PassFailure {
        error: CpmError::Convergence {
            pass: PassKind::Backward,
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
    use crate::cpm::forward::forward_pass;
    use crate::models::{Dependency, ScheduleRow, Task};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run_with(rows: &[ScheduleRow], config: &CpmConfig) -> Vec<NodeSchedule> {
        let calendar = Calendar::default();
        let graph = ScheduleGraph::build(rows, 0);
        let mut schedule = vec![NodeSchedule::default(); graph.len()];
        forward_pass(&graph, &calendar, date(2024, 1, 1), config, &mut schedule).unwrap();
        let project_end = schedule.iter().filter_map(|n| n.end).max().unwrap();
        backward_pass(&graph, &calendar, config, project_end, &mut schedule).unwrap();
        schedule
    }

    fn run(rows: &[ScheduleRow]) -> Vec<NodeSchedule> {
        run_with(rows, &CpmConfig::default())
    }

    fn late(schedule: &[NodeSchedule], node: usize) -> (NaiveDate, NaiveDate) {
        (
            schedule[node].late_start.unwrap(),
            schedule[node].late_finish.unwrap(),
        )
    }

    #[test]
    fn test_chain_is_tight() {
        let rows: Vec<ScheduleRow> = vec![
            Task::new("a", 5).into(),
            Task::new("b", 3)
                .with_dependency(Dependency::finish_to_start("a"))
                .into(),
        ];
        let schedule = run(&rows);
        assert_eq!(late(&schedule, 0), (date(2024, 1, 1), date(2024, 1, 5)));
        assert_eq!(late(&schedule, 1), (date(2024, 1, 8), date(2024, 1, 10)));
    }

    #[test]
    fn test_parallel_branch_gets_slack() {
        // a(5) -> c(1), b(2) -> c
        let rows: Vec<ScheduleRow> = vec![
            Task::new("a", 5).into(),
            Task::new("b", 2).into(),
            Task::new("c", 1)
                .with_dependency(Dependency::finish_to_start("a"))
                .with_dependency(Dependency::finish_to_start("b"))
                .into(),
        ];
        let schedule = run(&rows);
        // b must finish by Fri 5 so c can start Mon 8
        assert_eq!(late(&schedule, 1), (date(2024, 1, 4), date(2024, 1, 5)));
        assert_eq!(late(&schedule, 2), (date(2024, 1, 8), date(2024, 1, 8)));
    }

    #[test]
    fn test_inverse_link_formulas_are_tight() {
        // Every successor here drives the project end, so every
        // predecessor's late dates equal its early dates.
        for link_type in [
            LinkType::FinishToStart,
            LinkType::StartToStart,
            LinkType::FinishToFinish,
            LinkType::StartToFinish,
        ] {
            let rows: Vec<ScheduleRow> = vec![
                Task::new("a", 3).into(),
                Task::new("b", 20)
                    .with_dependency(Dependency::new("a", link_type, 2))
                    .into(),
            ];
            let schedule = run(&rows);
            assert_eq!(
                (schedule[0].late_start, schedule[0].late_finish),
                (schedule[0].start, schedule[0].end),
                "{:?}",
                link_type
            );
        }
    }

    #[test]
    fn test_deadline_tightening_is_opt_in() {
        let rows: Vec<ScheduleRow> = vec![Task::new("a", 5)
            .with_constraint(ConstraintType::Fnlt, Some(date(2024, 1, 3)))
            .into()];

        let schedule = run(&rows);
        assert_eq!(late(&schedule, 0), (date(2024, 1, 1), date(2024, 1, 5)));

        let config = CpmConfig {
            deadlines_tighten_late_dates: true,
            ..CpmConfig::default()
        };
        let schedule = run_with(&rows, &config);
        // Late dates move before the early dates; the violation is kept, not fixed.
        assert_eq!(late(&schedule, 0), (date(2023, 12, 28), date(2024, 1, 3)));
        assert_eq!(schedule[0].start, Some(date(2024, 1, 1)));
    }
}
