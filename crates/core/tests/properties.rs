use std::sync::Arc;

use nnplace_core::{
    device::Device,
    graph::Graph,
    node::{Node, NodeEntry, NodeId},
    op::{Op, OpRegistry},
    pass::insert_copy::{DeviceVector, InsertCopy, DEVICE_INDEX_ATTR},
};
use proptest::{prelude::*, sample::Index};

/// Device and input picks per node. Inputs only point at earlier nodes.
type GraphLayout = Vec<(i32, Vec<Index>)>;

fn graph_layout() -> impl Strategy<Value = GraphLayout> {
    prop::collection::vec(
        (-1..3i32, prop::collection::vec(any::<Index>(), 0..4)),
        1..16,
    )
}

fn build(layout: &GraphLayout) -> (Graph, Vec<NodeId>) {
    let op = Arc::new(Op::new("op"));
    let mut g = Graph::default();
    let mut ids = vec![];
    for (i, (device, picks)) in layout.iter().enumerate() {
        let mut node = if i == 0 || picks.is_empty() {
            Node::variable(format!("n{i}"))
        } else {
            Node::new(op.clone(), format!("n{i}"))
        };
        node = node.with_device(Device(*device));
        if i > 0 {
            node = node.with_ins(picks.iter().map(|p| NodeEntry::from(ids[p.index(i)])));
        }
        ids.push(g.add_node(node));
    }
    for &id in &ids {
        g.add_output(id);
    }
    (g, ids)
}

fn crossing_edges(g: &Graph, ids: &[NodeId]) -> usize {
    ids.iter()
        .map(|&id| {
            let node = &g.nodes[id];
            node.inputs
                .iter()
                .filter(|e| g.nodes[e.node].device() != node.device())
                .count()
        })
        .sum()
}

proptest! {
    #[test]
    fn one_copy_per_crossing_edge(layout in graph_layout()) {
        let (g, ids) = build(&layout);
        let expected = crossing_edges(&g, &ids);
        let num_nodes = g.nodes.len();

        let (g, report) = InsertCopy::new()
            .run_with_report(g, &OpRegistry::with_builtin_ops())
            .unwrap();

        prop_assert_eq!(report.len(), expected);
        prop_assert_eq!(g.nodes.len(), num_nodes + expected);
        // Only the copies' own inputs still cross.
        prop_assert_eq!(crossing_edges(&g, &ids), 0);
        for &copy in &report.copies {
            prop_assert_eq!(g.nodes[copy].inputs.len(), 1);
        }
    }

    #[test]
    fn second_run_inserts_nothing(layout in graph_layout()) {
        let ops = OpRegistry::with_builtin_ops();
        let (g, _) = build(&layout);
        let g = InsertCopy::new().run(g, &ops).unwrap();
        let num_nodes = g.nodes.len();

        let (g, report) = InsertCopy::new().run_with_report(g, &ops).unwrap();
        prop_assert!(report.is_empty());
        prop_assert_eq!(g.nodes.len(), num_nodes);
    }

    #[test]
    fn same_device_edges_are_untouched(layout in graph_layout()) {
        let (g, ids) = build(&layout);
        let before = ids
            .iter()
            .map(|&id| g.nodes[id].inputs.clone())
            .collect::<Vec<_>>();

        let g = InsertCopy::new()
            .run(g, &OpRegistry::with_builtin_ops())
            .unwrap();

        for (&id, inputs) in ids.iter().zip(&before) {
            let node = &g.nodes[id];
            prop_assert_eq!(node.inputs.len(), inputs.len());
            for (now, was) in node.inputs.iter().zip(inputs) {
                if g.nodes[was.node].device() == node.device() {
                    prop_assert_eq!(now, was);
                } else {
                    prop_assert_eq!(g.nodes[now.node].inputs[0], *was);
                }
            }
        }
    }

    #[test]
    fn device_map_covers_every_entry(layout in graph_layout()) {
        let (g, _) = build(&layout);
        let g = InsertCopy::new()
            .run(g, &OpRegistry::with_builtin_ops())
            .unwrap();

        let idx = g.indexed_graph().unwrap();
        let devices = g.attrs.get::<DeviceVector>(DEVICE_INDEX_ATTR).unwrap();
        prop_assert_eq!(devices.len(), idx.num_node_entries());
        for nid in 0..idx.num_nodes() as u32 {
            let inode = &idx[nid];
            prop_assert_eq!(devices[idx.entry_id(nid, 0)], g.nodes[inode.source].device());
            for e in &inode.inputs {
                prop_assert!(e.node_id < nid);
                prop_assert_eq!(
                    devices[idx.entry_id_of(e)],
                    g.nodes[idx[e.node_id].source].device()
                );
            }
        }
    }

    #[test]
    fn deterministic(layout in graph_layout()) {
        let ops = OpRegistry::with_builtin_ops();
        let run = || {
            let (g, _) = build(&layout);
            let (g, report) = InsertCopy::new().run_with_report(g, &ops).unwrap();
            let names = report
                .copies
                .iter()
                .map(|&id| g.nodes[id].name().to_string())
                .collect::<Vec<_>>();
            let devices = g.attrs.get::<DeviceVector>(DEVICE_INDEX_ATTR).unwrap().clone();
            (names, devices)
        };
        prop_assert_eq!(run(), run());
    }
}
