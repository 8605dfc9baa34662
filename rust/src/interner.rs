//! Task id interning.
//!
//! Maps string task ids to dense node ids so the passes can keep their state
//! in plain vectors instead of string-keyed maps.

use rustc_hash::FxHashMap;

/// Dense node id of an interned task.
pub type NodeId = u32;

/// String interner for task ids.
#[derive(Debug, Clone, Default)]
pub struct TaskIdInterner {
    to_node: FxHashMap<String, NodeId>,
    from_node: Vec<String>,
}

impl TaskIdInterner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_node: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            from_node: Vec::with_capacity(capacity),
        }
    }

    /// Intern an id that must not have been seen before.
    ///
    /// Returns `Err(existing)` with the node already holding this id.
    pub fn insert_unique(&mut self, id: &str) -> Result<NodeId, NodeId> {
        if let Some(&existing) = self.to_node.get(id) {
            return Err(existing);
        }
        let node = self.from_node.len() as NodeId;
        self.from_node.push(id.to_string());
        self.to_node.insert(id.to_string(), node);
        Ok(node)
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<NodeId> {
        self.to_node.get(id).copied()
    }

    #[inline]
    pub fn resolve(&self, node: NodeId) -> &str {
        &self.from_node[node as usize]
    }

    pub fn len(&self) -> usize {
        self.from_node.len()
    }
}
