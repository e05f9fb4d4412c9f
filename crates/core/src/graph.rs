use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
    attrs::AttrMap,
    indexed::IndexedGraph,
    node::{Node, NodeArena, NodeEntry, NodeId},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Graph contains a cycle through node '{0}'")]
    Cycle(String),

    #[error("Node #{0} does not belong to this graph")]
    DanglingNode(usize),

    #[error("Graph has more than u32::MAX entries (at node '{0}')")]
    TooManyEntries(String),

    #[error("Node '{node}' has {num_outputs} output(s) but output {index} is referenced")]
    InvalidEntry {
        node: String,
        index: u32,
        num_outputs: u32,
    },
}

#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub nodes: NodeArena,
    pub outputs: Vec<NodeEntry>,
    pub attrs: AttrMap,
}

impl Graph {
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.alloc(node)
    }

    pub fn add_output(&mut self, entry: impl Into<NodeEntry>) {
        self.outputs.push(entry.into());
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .get(id)
            .ok_or(GraphError::DanglingNode(id.index()))
    }

    /// Nodes reachable from the outputs through inputs and control dependencies,
    /// each exactly once, producers before consumers.
    pub fn post_order(&self) -> Result<Vec<NodeId>, GraphError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: FxHashMap<NodeId, Mark> = FxHashMap::default();
        let mut order = vec![];
        let mut stack: Vec<(NodeId, usize)> = vec![];

        for root in self.outputs.iter().map(|e| e.node) {
            if marks.contains_key(&root) {
                continue;
            }
            self.node(root)?;
            marks.insert(root, Mark::Visiting);
            stack.push((root, 0));

            while let Some((id, next)) = stack.last_mut() {
                let id = *id;
                let i = *next;
                *next += 1;

                let node = &self.nodes[id];
                let child = if i < node.inputs.len() {
                    Some(node.inputs[i].node)
                } else {
                    node.control_deps.get(i - node.inputs.len()).copied()
                };
                let Some(child) = child else {
                    marks.insert(id, Mark::Done);
                    order.push(id);
                    stack.pop();
                    continue;
                };

                match marks.get(&child) {
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => {
                        return Err(GraphError::Cycle(self.nodes[child].name().to_string()))
                    }
                    None => {
                        self.node(child)?;
                        marks.insert(child, Mark::Visiting);
                        stack.push((child, 0));
                    }
                }
            }
        }

        Ok(order)
    }

    /// Builds the indexed view of the current node set.
    /// Never cached: call again after any structural change.
    pub fn indexed_graph(&self) -> Result<IndexedGraph, GraphError> {
        IndexedGraph::build(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(graph: &Graph, order: &[NodeId]) -> Vec<String> {
        order
            .iter()
            .map(|&id| graph.nodes[id].name().to_string())
            .collect()
    }

    #[test]
    fn post_order_diamond() {
        let mut g = Graph::default();
        let a = g.add_node(Node::variable("a"));
        let b = g.add_node(Node::variable("b").with_in(a));
        let c = g.add_node(Node::variable("c").with_in(a));
        let d = g.add_node(Node::variable("d").with_in(b).with_in(c));
        g.add_output(d);

        let order = g.post_order().unwrap();
        assert_eq!(names(&g, &order), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn post_order_skips_unreachable() {
        let mut g = Graph::default();
        let a = g.add_node(Node::variable("a"));
        let _dead = g.add_node(Node::variable("dead").with_in(a));
        let b = g.add_node(Node::variable("b").with_in(a));
        g.add_output(b);
        g.add_output(a);

        let order = g.post_order().unwrap();
        assert_eq!(names(&g, &order), vec!["a", "b"]);
    }

    #[test]
    fn post_order_follows_control_deps() {
        let mut g = Graph::default();
        let init = g.add_node(Node::variable("init"));
        let x = g.add_node(Node::variable("x"));
        let y = g.add_node(Node::variable("y").with_in(x).with_control_dep(init));
        g.add_output(y);

        let order = g.post_order().unwrap();
        assert_eq!(names(&g, &order), vec!["x", "init", "y"]);
    }

    #[test]
    fn post_order_detects_cycle() {
        let mut g = Graph::default();
        let a = g.add_node(Node::variable("a"));
        let b = g.add_node(Node::variable("b").with_in(a));
        g.nodes[a].inputs.push(b.into());
        g.add_output(b);

        assert_eq!(g.post_order(), Err(GraphError::Cycle("b".into())));
    }

    #[test]
    fn dangling_output() {
        let mut other = Graph::default();
        let foreign = other.add_node(Node::variable("foreign"));

        let mut g = Graph::default();
        g.add_node(Node::variable("a"));
        g.add_output(foreign);
        assert_eq!(g.post_order(), Err(GraphError::DanglingNode(0)));
    }
}
