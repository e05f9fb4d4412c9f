use std::ops::Index;

use rustc_hash::FxHashMap;

use crate::{
    graph::{Graph, GraphError},
    node::{NodeEntry, NodeId},
};

/// A [`NodeEntry`] expressed with dense node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexedEntry {
    pub node_id: u32,
    pub index: u32,
    pub version: u32,
}

#[derive(Debug, Clone)]
pub struct IndexedNode {
    pub source: NodeId,
    pub inputs: Vec<IndexedEntry>,
    pub control_deps: Vec<u32>,
}

/// Topologically ordered view of the nodes reachable from a graph's outputs.
///
/// Node ids are dense and every node's id is greater than the ids of the nodes
/// it depends on. Entries (node, output slot) are numbered densely in node id
/// order, so the entries of node `i` are `entry_id(i, 0)..entry_id(i + 1, 0)`.
#[derive(Debug, Clone)]
pub struct IndexedGraph {
    nodes: Vec<IndexedNode>,
    node_row_ptr: Vec<u32>,
    node_ids: FxHashMap<NodeId, u32>,
    input_nodes: Vec<u32>,
    outputs: Vec<IndexedEntry>,
}

impl IndexedGraph {
    pub fn build(graph: &Graph) -> Result<Self, GraphError> {
        let order = graph.post_order()?;

        let node_ids = order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32))
            .collect::<FxHashMap<_, _>>();

        let to_indexed = |e: &NodeEntry| -> Result<IndexedEntry, GraphError> {
            let producer = graph.node(e.node)?;
            let num_outputs = producer.num_outputs();
            if e.index >= num_outputs {
                return Err(GraphError::InvalidEntry {
                    node: producer.name().to_string(),
                    index: e.index,
                    num_outputs,
                });
            }
            let node_id = *node_ids
                .get(&e.node)
                .ok_or(GraphError::DanglingNode(e.node.index()))?;
            Ok(IndexedEntry {
                node_id,
                index: e.index,
                version: e.version,
            })
        };

        let mut nodes = Vec::with_capacity(order.len());
        let mut node_row_ptr = Vec::with_capacity(order.len() + 1);
        let mut input_nodes = vec![];
        node_row_ptr.push(0u32);

        for (nid, &id) in order.iter().enumerate() {
            let node = &graph.nodes[id];
            if node.is_variable() {
                input_nodes.push(nid as u32);
            }
            let inputs = node
                .inputs
                .iter()
                .map(&to_indexed)
                .collect::<Result<Vec<_>, _>>()?;
            let control_deps = node
                .control_deps
                .iter()
                .map(|dep| {
                    node_ids
                        .get(dep)
                        .copied()
                        .ok_or(GraphError::DanglingNode(dep.index()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            nodes.push(IndexedNode {
                source: id,
                inputs,
                control_deps,
            });
            let next = node_row_ptr[nid]
                .checked_add(node.num_outputs())
                .ok_or_else(|| GraphError::TooManyEntries(node.name().to_string()))?;
            node_row_ptr.push(next);
        }

        let outputs = graph
            .outputs
            .iter()
            .map(&to_indexed)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            nodes,
            node_row_ptr,
            node_ids,
            input_nodes,
            outputs,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_node_entries(&self) -> usize {
        self.node_row_ptr.last().copied().unwrap_or(0) as usize
    }

    pub fn entry_id(&self, node_id: u32, index: u32) -> usize {
        (self.node_row_ptr[node_id as usize] + index) as usize
    }

    pub fn entry_id_of(&self, e: &IndexedEntry) -> usize {
        self.entry_id(e.node_id, e.index)
    }

    /// `None` if the entry's node isn't part of this view.
    pub fn entry_id_for(&self, e: &NodeEntry) -> Option<usize> {
        let node_id = self.node_id(e.node)?;
        Some(self.entry_id(node_id, e.index))
    }

    pub fn node_id(&self, id: NodeId) -> Option<u32> {
        self.node_ids.get(&id).copied()
    }

    pub fn nodes(&self) -> &[IndexedNode] {
        &self.nodes
    }

    /// Ids of the variable nodes, in id order.
    pub fn input_nodes(&self) -> &[u32] {
        &self.input_nodes
    }

    pub fn outputs(&self) -> &[IndexedEntry] {
        &self.outputs
    }
}

impl Index<u32> for IndexedGraph {
    type Output = IndexedNode;

    fn index(&self, node_id: u32) -> &Self::Output {
        &self.nodes[node_id as usize]
    }
}
