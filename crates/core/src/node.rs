use std::{any::Any, sync::Arc};

use id_arena::{Arena, Id};
use rustc_hash::FxHashMap;

use crate::{attrs::AttrValue, device::Device, op::Op};

pub type NodeId = Id<Node>;
pub type NodeArena = Arena<Node>;

/// One output slot of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeEntry {
    pub node: NodeId,
    pub index: u32,
    pub version: u32,
}

impl NodeEntry {
    pub const fn new(node: NodeId, index: u32) -> Self {
        Self {
            node,
            index,
            version: 0,
        }
    }

    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

impl From<NodeId> for NodeEntry {
    fn from(node: NodeId) -> Self {
        Self::new(node, 0)
    }
}

#[derive(Default, Clone)]
pub struct NodeAttrs {
    /// `None` for variables (graph inputs and placeholders).
    pub op: Option<Arc<Op>>,
    pub name: String,
    pub device: Device,
    /// Raw attributes as given by the front-end.
    pub dict: FxHashMap<String, String>,
    /// Filled in by the operator's attribute parser.
    pub parsed: Option<AttrValue>,
}

impl NodeAttrs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_op(mut self, op: Arc<Op>) -> Self {
        self.op = Some(op);
        self
    }

    pub fn with_device(mut self, device: impl Into<Device>) -> Self {
        self.device = device.into();
        self
    }

    pub fn parsed<T: Any>(&self) -> Option<&T> {
        self.parsed.as_ref()?.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for NodeAttrs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeAttrs")
            .field("op", &self.op.as_ref().map(|op| op.name.as_str()))
            .field("name", &self.name)
            .field("device", &self.device)
            .field("dict", &self.dict)
            .field("parsed", &self.parsed.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub attrs: NodeAttrs,
    pub inputs: Vec<NodeEntry>,
    /// Ordering-only dependencies. They carry no data.
    pub control_deps: Vec<NodeId>,
}

impl Node {
    pub fn new(op: Arc<Op>, name: impl Into<String>) -> Self {
        Self::from_attrs(NodeAttrs::new(name).with_op(op))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::from_attrs(NodeAttrs::new(name))
    }

    pub fn from_attrs(attrs: NodeAttrs) -> Self {
        Self {
            attrs,
            inputs: Vec::new(),
            control_deps: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: impl Into<Device>) -> Self {
        self.attrs.device = device.into();
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.dict.insert(key.into(), value.into());
        self
    }

    pub fn with_in(mut self, entry: impl Into<NodeEntry>) -> Self {
        self.inputs.push(entry.into());
        self
    }

    pub fn with_ins(mut self, entries: impl IntoIterator<Item = NodeEntry>) -> Self {
        self.inputs.extend(entries);
        self
    }

    pub fn with_control_dep(mut self, id: NodeId) -> Self {
        self.control_deps.push(id);
        self
    }

    pub fn alloc(self, arena: &mut NodeArena) -> NodeId {
        arena.alloc(self)
    }

    pub fn name(&self) -> &str {
        &self.attrs.name
    }

    pub fn device(&self) -> Device {
        self.attrs.device
    }

    pub fn op(&self) -> Option<&Op> {
        self.attrs.op.as_deref()
    }

    pub fn is_variable(&self) -> bool {
        self.attrs.op.is_none()
    }

    pub fn num_outputs(&self) -> u32 {
        self.op().map_or(1, |op| op.num_outputs)
    }
}

#[test]
fn build_node() {
    let mut arena = NodeArena::new();
    let x = Node::variable("x").with_device(0).alloc(&mut arena);
    let split = Arc::new(Op::new("split").with_num_outputs(2));
    let s = Node::new(split, "s")
        .with_device(1)
        .with_in(x)
        .with_attr("axis", "0")
        .alloc(&mut arena);
    let relu = Arc::new(Op::new("relu"));
    let r = Node::new(relu, "r")
        .with_in(NodeEntry::new(s, 1).with_version(2))
        .with_control_dep(x)
        .alloc(&mut arena);

    assert!(arena[x].is_variable());
    assert_eq!(arena[x].num_outputs(), 1);
    assert_eq!(arena[s].num_outputs(), 2);
    assert_eq!(arena[s].device(), Device(1));
    assert_eq!(arena[s].attrs.dict["axis"], "0");
    assert_eq!(arena[r].device(), Device::UNSET);
    assert_eq!(arena[r].inputs[0].index, 1);
    assert_eq!(arena[r].inputs[0].version, 2);
    assert_eq!(arena[r].control_deps, vec![x]);
    assert_eq!(arena[r].op().map(|op| op.name.as_str()), Some("relu"));
}
