//! Graph construction: hierarchy, successor index and pass ordering.
//!
//! Everything the passes need is resolved here once per run:
//! - task ids interned to dense node ids
//! - parent/child links and depth (summary tasks vs. leaves)
//! - predecessor lists and the successor index, leaf to leaf
//! - a topological order of the leaves (Kahn), with cycle members isolated

use rustc_hash::FxHashSet;
use std::collections::VecDeque;

use crate::interner::{NodeId, TaskIdInterner};
use crate::models::{LinkType, ScheduleRow, Task};
use crate::{log_debug, log_task};

use super::types::ValidationError;

/// Incoming link of a leaf task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PredecessorLink {
    pub predecessor: NodeId,
    pub link_type: LinkType,
    pub lag: i64,
}

/// Outgoing link of a leaf task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SuccessorLink {
    pub successor: NodeId,
    pub link_type: LinkType,
    pub lag: i64,
    pub successor_duration: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Resolved task graph for one calculation run.
pub(crate) struct ScheduleGraph<'a> {
    pub interner: TaskIdInterner,
    /// Task rows by node id.
    pub tasks: Vec<&'a Task>,
    /// Node of each input row; `None` for separators and duplicate ids.
    pub row_nodes: Vec<Option<NodeId>>,
    pub parent: Vec<Option<NodeId>>,
    pub children: Vec<Vec<NodeId>>,
    pub depth: Vec<u32>,
    pub predecessors: Vec<Vec<PredecessorLink>>,
    pub successors: Vec<Vec<SuccessorLink>>,
    /// Leaves with a dependency that could not be resolved.
    pub unresolved: Vec<bool>,
    /// Leaves, predecessors first. Nodes caught in or behind a cycle come last.
    pub leaf_order: Vec<NodeId>,
    /// Summary tasks, deepest first.
    pub parents_by_depth: Vec<NodeId>,
    /// Leaves that sit on a dependency cycle.
    pub cycle: Vec<NodeId>,
    pub warnings: Vec<ValidationError>,
}

impl<'a> ScheduleGraph<'a> {
    pub fn build(rows: &'a [ScheduleRow], verbosity: u8) -> Self {
        let mut interner = TaskIdInterner::with_capacity(rows.len());
        let mut tasks: Vec<&'a Task> = Vec::with_capacity(rows.len());
        let mut row_nodes = Vec::with_capacity(rows.len());
        let mut separator_ids: FxHashSet<&str> = FxHashSet::default();
        let mut warnings = Vec::new();

        for row in rows {
            match row {
                ScheduleRow::Task(task) => match interner.insert_unique(&task.id) {
                    Ok(node) => {
                        tasks.push(task);
                        row_nodes.push(Some(node));
                    }
                    Err(_) => {
                        log_task!(verbosity, "duplicate task id {}", task.id);
                        warnings.push(ValidationError::DuplicateTaskId {
                            task_id: task.id.clone(),
                        });
                        row_nodes.push(None);
                    }
                },
                ScheduleRow::Separator(separator) => {
                    separator_ids.insert(separator.id.as_str());
                    row_nodes.push(None);
                }
            }
        }

        let n = tasks.len();
        let mut graph = Self {
            interner,
            tasks,
            row_nodes,
            parent: vec![None; n],
            children: vec![Vec::new(); n],
            depth: vec![0; n],
            predecessors: vec![Vec::new(); n],
            successors: vec![Vec::new(); n],
            unresolved: vec![false; n],
            leaf_order: Vec::with_capacity(n),
            parents_by_depth: Vec::new(),
            cycle: Vec::new(),
            warnings,
        };

        graph.resolve_hierarchy(&separator_ids, verbosity);
        graph.resolve_dependencies(&separator_ids, verbosity);
        graph.order_leaves(verbosity);

        graph.parents_by_depth = (0..n as NodeId)
            .filter(|&node| graph.is_parent(node))
            .collect();
        // Stable: ties keep input order.
        let depth = &graph.depth;
        graph
            .parents_by_depth
            .sort_by_key(|&node| std::cmp::Reverse(depth[node as usize]));

        graph
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    #[inline]
    pub fn task(&self, node: NodeId) -> &'a Task {
        self.tasks[node as usize]
    }

    #[inline]
    pub fn id(&self, node: NodeId) -> &str {
        self.interner.resolve(node)
    }

    #[inline]
    pub fn is_parent(&self, node: NodeId) -> bool {
        !self.children[node as usize].is_empty()
    }

    pub fn ids(&self, nodes: &[NodeId]) -> Vec<String> {
        nodes.iter().map(|&node| self.id(node).to_string()).collect()
    }

    /// Leaves linked to any of `seeds` through dependencies in either direction.
    pub fn connected_to(&self, seeds: &[NodeId]) -> Vec<bool> {
        let mut reached = vec![false; self.len()];
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for &seed in seeds {
            if !reached[seed as usize] {
                reached[seed as usize] = true;
                queue.push_back(seed);
            }
        }
        while let Some(node) = queue.pop_front() {
            let slot = node as usize;
            let neighbours = self.predecessors[slot]
                .iter()
                .map(|link| link.predecessor)
                .chain(self.successors[slot].iter().map(|link| link.successor));
            for next in neighbours {
                if !reached[next as usize] {
                    reached[next as usize] = true;
                    queue.push_back(next);
                }
            }
        }
        reached
    }

    fn resolve_hierarchy(&mut self, separator_ids: &FxHashSet<&str>, verbosity: u8) {
        let n = self.len();

        for node in 0..n {
            let task = self.tasks[node];
            let Some(parent_id) = task.parent_id.as_deref() else {
                continue;
            };
            match self.interner.get(parent_id) {
                Some(parent) => self.parent[node] = Some(parent),
                // Grouping under a separator has no scheduling meaning.
                None if separator_ids.contains(parent_id) => {}
                None => {
                    log_task!(verbosity, "task {} has unknown parent {}", task.id, parent_id);
                    self.warnings.push(ValidationError::UnknownParent {
                        task_id: task.id.clone(),
                        parent_id: parent_id.to_string(),
                    });
                }
            }
        }

        // Depth by walking parent chains; a chain that revisits an active node is cut there.
        let mut visit = vec![Visit::New; n];
        for root in 0..n {
            let mut path: Vec<usize> = Vec::new();
            let mut current = root;
            loop {
                match visit[current] {
                    Visit::Done => break,
                    Visit::Active => {
                        let task = self.tasks[current];
                        log_task!(verbosity, "parent chain of {} loops", task.id);
                        self.warnings.push(ValidationError::HierarchyCycle {
                            task_id: task.id.clone(),
                        });
                        self.parent[current] = None;
                        self.depth[current] = 0;
                        visit[current] = Visit::Done;
                        break;
                    }
                    Visit::New => {
                        visit[current] = Visit::Active;
                        path.push(current);
                        match self.parent[current] {
                            Some(parent) => current = parent as usize,
                            None => break,
                        }
                    }
                }
            }
            for &node in path.iter().rev() {
                if visit[node] == Visit::Done {
                    continue;
                }
                self.depth[node] = self.parent[node]
                    .map(|parent| self.depth[parent as usize] + 1)
                    .unwrap_or(0);
                visit[node] = Visit::Done;
            }
        }

        for node in 0..n {
            if let Some(parent) = self.parent[node] {
                self.children[parent as usize].push(node as NodeId);
            }
        }
    }

    fn resolve_dependencies(&mut self, separator_ids: &FxHashSet<&str>, verbosity: u8) {
        for node in 0..self.len() {
            let task = self.tasks[node];
            if task.dependencies.is_empty() {
                continue;
            }

            if !self.children[node].is_empty() {
                log_task!(
                    verbosity,
                    "summary task {} carries {} dependencies; ignored",
                    task.id,
                    task.dependencies.len()
                );
                self.warnings.push(ValidationError::ParentDependenciesIgnored {
                    task_id: task.id.clone(),
                    count: task.dependencies.len(),
                });
                continue;
            }

            for dep in &task.dependencies {
                let predecessor_id = dep.predecessor_id.as_str();
                match self.interner.get(predecessor_id) {
                    Some(predecessor) if self.is_parent(predecessor) => {
                        log_task!(
                            verbosity,
                            "task {} depends on summary task {}",
                            task.id,
                            predecessor_id
                        );
                        self.unresolved[node] = true;
                        self.warnings.push(ValidationError::SummaryPredecessor {
                            task_id: task.id.clone(),
                            predecessor_id: predecessor_id.to_string(),
                        });
                    }
                    Some(predecessor) => {
                        let lag = i64::from(dep.lag);
                        self.predecessors[node].push(PredecessorLink {
                            predecessor,
                            link_type: dep.link_type,
                            lag,
                        });
                        self.successors[predecessor as usize].push(SuccessorLink {
                            successor: node as NodeId,
                            link_type: dep.link_type,
                            lag,
                            successor_duration: task.duration,
                        });
                    }
                    None if separator_ids.contains(predecessor_id) => {
                        log_debug!(
                            verbosity,
                            "dropping dependency of {} on separator {}",
                            task.id,
                            predecessor_id
                        );
                    }
                    None => {
                        log_task!(
                            verbosity,
                            "task {} depends on unknown task {}",
                            task.id,
                            predecessor_id
                        );
                        self.unresolved[node] = true;
                        self.warnings.push(ValidationError::UnknownPredecessor {
                            task_id: task.id.clone(),
                            predecessor_id: predecessor_id.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Kahn's algorithm over leaves, seeded in input order.
    fn order_leaves(&mut self, verbosity: u8) {
        let n = self.len();
        let is_leaf: Vec<bool> = (0..n).map(|node| self.children[node].is_empty()).collect();

        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut queue: VecDeque<NodeId> = (0..n)
            .filter(|&node| is_leaf[node] && in_degree[node] == 0)
            .map(|node| node as NodeId)
            .collect();

        let mut placed = vec![false; n];
        while let Some(node) = queue.pop_front() {
            placed[node as usize] = true;
            self.leaf_order.push(node);
            for link in &self.successors[node as usize] {
                let successor = link.successor as usize;
                in_degree[successor] -= 1;
                if in_degree[successor] == 0 {
                    queue.push_back(link.successor);
                }
            }
        }

        let leftover: Vec<usize> = (0..n).filter(|&node| is_leaf[node] && !placed[node]).collect();
        if leftover.is_empty() {
            return;
        }
        self.leaf_order
            .extend(leftover.iter().map(|&node| node as NodeId));

        // Peel off nodes merely downstream of a cycle: repeatedly drop leftovers
        // with no successor among the remaining leftovers.
        let mut remaining = vec![false; n];
        for &node in &leftover {
            remaining[node] = true;
        }
        let mut out_degree = vec![0usize; n];
        for &node in &leftover {
            out_degree[node] = self.successors[node]
                .iter()
                .filter(|link| remaining[link.successor as usize])
                .count();
        }
        let mut sinks: VecDeque<usize> = leftover
            .iter()
            .copied()
            .filter(|&node| out_degree[node] == 0)
            .collect();
        while let Some(node) = sinks.pop_front() {
            remaining[node] = false;
            for link in &self.predecessors[node] {
                let predecessor = link.predecessor as usize;
                if remaining[predecessor] {
                    out_degree[predecessor] -= 1;
                    if out_degree[predecessor] == 0 {
                        sinks.push_back(predecessor);
                    }
                }
            }
        }

        self.cycle = leftover
            .into_iter()
            .filter(|&node| remaining[node])
            .map(|node| node as NodeId)
            .collect();
        log_task!(
            verbosity,
            "dependency cycle through {:?}",
            self.ids(&self.cycle)
        );
    }
}
