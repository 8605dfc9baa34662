//! Critical path marking.

use super::index::ScheduleGraph;
use super::types::NodeSchedule;

/// Leaves are critical when total float is zero or negative. A parent is
/// critical when any direct child is, whatever its own float says.
///
/// Returns the number of critical leaves.
pub(crate) fn mark_critical(graph: &ScheduleGraph<'_>, schedule: &mut [NodeSchedule]) -> usize {
    let mut count = 0;
    for &node in &graph.leaf_order {
        let current = &mut schedule[node as usize];
        current.is_critical = current.total_float.is_some_and(|float| float <= 0);
        if current.is_critical {
            count += 1;
        }
    }

    for &parent in &graph.parents_by_depth {
        let critical = graph.children[parent as usize]
            .iter()
            .any(|&child| schedule[child as usize].is_critical);
        schedule[parent as usize].is_critical = critical;
    }

    count
}
