use std::{sync::Arc, time::Instant};

use crate::{
    device::Device,
    graph::{Graph, GraphError},
    node::{Node, NodeAttrs, NodeEntry, NodeId},
    op::{Op, OpError, OpRegistry, DEVICE_COPY_OP},
};

use super::{PassError, PassInfo};

pub const PASS_NAME: &str = "InsertDataCopy";

/// Graph attribute holding a [`DeviceVector`].
pub const DEVICE_INDEX_ATTR: &str = "device_index";

/// Device of every entry, indexed by the entry ids of the graph's `IndexedGraph`.
pub type DeviceVector = Vec<Device>;

pub(super) fn pass_info() -> PassInfo {
    PassInfo::new(PASS_NAME, insert_data_copy)
        .describe(
            "Insert cross device data copy nodes to transfer data between \
             operators that are executed on different devices.",
        )
        .set_change_graph(true)
        .provide_graph_attr(DEVICE_INDEX_ATTR)
}

fn insert_data_copy(graph: Graph, ops: &OpRegistry) -> Result<Graph, PassError> {
    InsertCopy::new().run(graph, ops)
}

/// Copy nodes created by one run, in creation order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopyReport {
    pub copies: Vec<NodeId>,
}

impl CopyReport {
    pub fn len(&self) -> usize {
        self.copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }
}

/// Splices a copy node into every edge whose producer and consumer are placed
/// on different devices, then publishes the device of every entry under
/// [`DEVICE_INDEX_ATTR`].
///
/// The copy runs on the consumer's device. Every crossing edge gets its own
/// copy node, even when a producer feeds several consumers on the same device.
/// Nodes already using the copy operator are not rewritten, so running the
/// pass again on its own output inserts nothing.
#[derive(Debug, Clone, Copy)]
pub struct InsertCopy<'a> {
    copy_op_name: &'a str,
    attr_key: &'a str,
    slot_suffix: bool,
}

impl Default for InsertCopy<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> InsertCopy<'a> {
    pub const fn new() -> Self {
        Self {
            copy_op_name: DEVICE_COPY_OP,
            attr_key: DEVICE_INDEX_ATTR,
            slot_suffix: false,
        }
    }

    pub const fn with_copy_op_name(mut self, copy_op_name: &'a str) -> Self {
        self.copy_op_name = copy_op_name;
        self
    }

    pub const fn with_attr_key(mut self, attr_key: &'a str) -> Self {
        self.attr_key = attr_key;
        self
    }

    /// Appends the consumer's input slot to copy names, so a producer feeding
    /// two slots of the same consumer yields two distinct names.
    pub const fn with_slot_suffix(mut self, slot_suffix: bool) -> Self {
        self.slot_suffix = slot_suffix;
        self
    }

    pub fn run(&self, graph: Graph, ops: &OpRegistry) -> Result<Graph, PassError> {
        self.run_with_report(graph, ops).map(|(graph, _)| graph)
    }

    pub fn run_with_report(
        &self,
        mut graph: Graph,
        ops: &OpRegistry,
    ) -> Result<(Graph, CopyReport), PassError> {
        let start = Instant::now();

        let copy_op = ops.get(self.copy_op_name)?;
        if copy_op.num_outputs != 1 || copy_op.num_inputs.is_some_and(|n| n != 1) {
            return Err(OpError::InvalidCopyOp {
                op: copy_op.name.clone(),
                num_inputs: copy_op.num_inputs,
                num_outputs: copy_op.num_outputs,
            }
            .into());
        }
        let copies = self.insert_copy_nodes(&mut graph, &copy_op)?;
        let device_vec = device_vector(&graph)?;
        graph.attrs.insert(self.attr_key, device_vec);

        log::info!("insert_copy({}): {:?}", copies.len(), start.elapsed());

        Ok((graph, CopyReport { copies }))
    }

    fn insert_copy_nodes(
        &self,
        graph: &mut Graph,
        copy_op: &Arc<Op>,
    ) -> Result<Vec<NodeId>, PassError> {
        // Visit order is fixed up front. Copy nodes created below are never visited.
        let nodes = graph.post_order()?;
        let mut copies = vec![];

        for node_id in nodes {
            // A copy node's input is the crossing it mediates.
            if graph.nodes[node_id].op() == Some(copy_op.as_ref()) {
                continue;
            }
            let device = graph.nodes[node_id].device();
            for i in 0..graph.nodes[node_id].inputs.len() {
                let entry = graph.nodes[node_id].inputs[i];
                let producer = &graph.nodes[entry.node];
                if producer.device() == device {
                    continue;
                }

                let name = self.copy_name(producer.name(), graph.nodes[node_id].name(), i);
                log::debug!(
                    "{name}: {} ({}) -> {} ({device})",
                    producer.name(),
                    producer.device(),
                    graph.nodes[node_id].name(),
                );

                let mut attrs = NodeAttrs::new(name)
                    .with_op(copy_op.clone())
                    .with_device(device);
                copy_op.parse_attrs(&mut attrs)?;

                let copy_id = graph.add_node(Node::from_attrs(attrs).with_in(entry));
                graph.nodes[node_id].inputs[i] = NodeEntry::new(copy_id, 0);
                copies.push(copy_id);
            }
        }

        Ok(copies)
    }

    fn copy_name(&self, producer: &str, consumer: &str, slot: usize) -> String {
        if self.slot_suffix {
            format!("__copy_{producer}_to_{consumer}_{slot}")
        } else {
            format!("__copy_{producer}_to_{consumer}")
        }
    }
}

/// Device of every entry in the graph's current `IndexedGraph`.
///
/// Every entry is first seeded with the device of the node owning it, then each
/// entry referenced by an edge is overwritten with the device of the edge's
/// source node.
pub fn device_vector(graph: &Graph) -> Result<DeviceVector, GraphError> {
    let idx = graph.indexed_graph()?;
    let mut device_vec = vec![Device::UNSET; idx.num_node_entries()];

    for nid in 0..idx.num_nodes() as u32 {
        let device = graph.nodes[idx[nid].source].device();
        let entries = idx.entry_id(nid, 0)..idx.entry_id(nid + 1, 0);
        device_vec[entries].fill(device);
    }

    for inode in idx.nodes() {
        for e in &inode.inputs {
            device_vec[idx.entry_id_of(e)] = graph.nodes[idx[e.node_id].source].device();
        }
    }

    Ok(device_vec)
}
