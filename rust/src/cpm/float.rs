//! Total and free float.

use crate::calendar::Calendar;
use crate::models::LinkType;

use super::index::ScheduleGraph;
use super::types::NodeSchedule;

/// Compute float for every dated leaf, then take the minimum over children
/// for every parent (deepest first). Parents get no free float.
pub(crate) fn compute_float(graph: &ScheduleGraph<'_>, calendar: &Calendar, schedule: &mut [NodeSchedule]) {
    for &node in &graph.leaf_order {
        let current = &schedule[node as usize];
        let (Some(start), Some(end), Some(late_start)) =
            (current.start, current.end, current.late_start)
        else {
            continue;
        };

        let total = calendar.work_days_between(start, late_start);

        let mut free: Option<i64> = None;
        for link in &graph.successors[node as usize] {
            let successor = &schedule[link.successor as usize];
            let (Some(succ_start), Some(succ_end)) = (successor.start, successor.end) else {
                continue;
            };
            let gap = match link.link_type {
                LinkType::FinishToStart => calendar.work_days_between(end, succ_start) - 1 - link.lag,
                LinkType::StartToStart => calendar.work_days_between(start, succ_start) - link.lag,
                LinkType::FinishToFinish => calendar.work_days_between(end, succ_end) - link.lag,
                LinkType::StartToFinish => calendar.work_days_between(start, succ_end) - link.lag,
            };
            free = Some(free.map_or(gap, |f| f.min(gap)));
        }

        let current = &mut schedule[node as usize];
        current.total_float = Some(total);
        current.free_float = Some(free.unwrap_or(total).min(total));
    }

    for &parent in &graph.parents_by_depth {
        let total = graph.children[parent as usize]
            .iter()
            .filter_map(|&child| schedule[child as usize].total_float)
            .min();
        schedule[parent as usize].total_float = total;
    }
}
