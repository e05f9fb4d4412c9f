use std::{borrow::Cow, sync::Arc};

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{device::Device, node::NodeAttrs};

/// Name the copy operator is registered under.
pub const DEVICE_COPY_OP: &str = "device_copy_op";

/// Derives the parsed payload of a node from its raw attributes.
pub type AttrParser = fn(&mut NodeAttrs) -> Result<(), OpError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error("Operator '{0}' is not registered")]
    NotRegistered(String),

    #[error("Operator '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Operator '{op}' can't copy data: it takes {num_inputs:?} input(s) and has {num_outputs} output(s)")]
    InvalidCopyOp {
        op: String,
        num_inputs: Option<u32>,
        num_outputs: u32,
    },

    #[error("Node '{node}' has an invalid attribute for '{op}': {message}")]
    InvalidAttr {
        op: String,
        node: String,
        message: Cow<'static, str>,
    },
}

/// Operator descriptor. Passes only see it through the registry.
#[derive(Clone)]
pub struct Op {
    pub name: String,
    pub description: String,
    /// `None` means variadic.
    pub num_inputs: Option<u32>,
    pub num_outputs: u32,
    pub attr_parser: Option<AttrParser>,
}

impl Op {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            num_inputs: None,
            num_outputs: 1,
            attr_parser: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_num_inputs(mut self, n: u32) -> Self {
        self.num_inputs = Some(n);
        self
    }

    pub fn with_num_outputs(mut self, n: u32) -> Self {
        self.num_outputs = n;
        self
    }

    pub fn with_attr_parser(mut self, parser: AttrParser) -> Self {
        self.attr_parser = Some(parser);
        self
    }

    /// Runs the attribute parser, if any.
    pub fn parse_attrs(&self, attrs: &mut NodeAttrs) -> Result<(), OpError> {
        match self.attr_parser {
            Some(parser) => parser(attrs),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Op")
            .field("name", &self.name)
            .field("num_inputs", &self.num_inputs)
            .field("num_outputs", &self.num_outputs)
            .field("has_attr_parser", &self.attr_parser.is_some())
            .finish()
    }
}

impl PartialEq for Op {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Parsed attributes of a `device_copy_op` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCopyParam {
    pub dst: Device,
}

fn parse_device_copy(attrs: &mut NodeAttrs) -> Result<(), OpError> {
    if let Some(dst) = attrs.dict.get("dst") {
        let invalid = |message: Cow<'static, str>| OpError::InvalidAttr {
            op: DEVICE_COPY_OP.to_string(),
            node: attrs.name.clone(),
            message,
        };
        let dst = dst
            .parse::<i32>()
            .map_err(|_| invalid(format!("'dst' is not a device id: {dst:?}").into()))?;
        if Device(dst) != attrs.device {
            return Err(invalid(
                format!("'dst' is dev{dst} but the node runs on {}", attrs.device).into(),
            ));
        }
    }
    attrs.parsed = Some(Arc::new(DeviceCopyParam { dst: attrs.device }));
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct OpRegistry {
    ops: FxHashMap<String, Arc<Op>>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the operators passes in this crate rely on.
    pub fn with_builtin_ops() -> Self {
        let mut registry = Self::new();
        let copy = Op::new(DEVICE_COPY_OP)
            .describe("Copy a tensor to the device the node is placed on.")
            .with_num_inputs(1)
            .with_num_outputs(1)
            .with_attr_parser(parse_device_copy);
        // Fresh registry, so this can't collide.
        registry.ops.insert(copy.name.clone(), Arc::new(copy));
        registry
    }

    pub fn register(&mut self, op: Op) -> Result<Arc<Op>, OpError> {
        if self.ops.contains_key(&op.name) {
            return Err(OpError::AlreadyRegistered(op.name));
        }
        let op = Arc::new(op);
        self.ops.insert(op.name.clone(), op.clone());
        Ok(op)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Op>, OpError> {
        self.ops
            .get(name)
            .cloned()
            .ok_or_else(|| OpError::NotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names = self.ops.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_copy_op() {
        let registry = OpRegistry::with_builtin_ops();
        let copy = registry.get(DEVICE_COPY_OP).unwrap();
        assert_eq!(copy.num_inputs, Some(1));
        assert_eq!(copy.num_outputs, 1);
        assert!(copy.attr_parser.is_some());
        assert_eq!(registry.names(), vec![DEVICE_COPY_OP]);
    }

    #[test]
    fn register_twice() {
        let mut registry = OpRegistry::new();
        registry.register(Op::new("relu")).unwrap();
        assert_eq!(
            registry.register(Op::new("relu")).unwrap_err(),
            OpError::AlreadyRegistered("relu".into())
        );
        assert_eq!(
            registry.get("gelu").unwrap_err(),
            OpError::NotRegistered("gelu".into())
        );
    }

    #[test]
    fn parse_copy_attrs() {
        let registry = OpRegistry::with_builtin_ops();
        let copy = registry.get(DEVICE_COPY_OP).unwrap();

        let mut attrs = NodeAttrs::new("c").with_device(Device(2));
        copy.parse_attrs(&mut attrs).unwrap();
        assert_eq!(
            attrs.parsed::<DeviceCopyParam>(),
            Some(&DeviceCopyParam { dst: Device(2) })
        );

        let mut attrs = NodeAttrs::new("c").with_device(Device(2));
        attrs.dict.insert("dst".into(), "2".into());
        assert!(copy.parse_attrs(&mut attrs).is_ok());

        attrs.dict.insert("dst".into(), "1".into());
        assert!(matches!(
            copy.parse_attrs(&mut attrs),
            Err(OpError::InvalidAttr { .. })
        ));

        attrs.dict.insert("dst".into(), "gpu".into());
        assert!(matches!(
            copy.parse_attrs(&mut attrs),
            Err(OpError::InvalidAttr { .. })
        ));
    }

    #[test]
    fn no_parser_is_noop() {
        let op = Op::new("relu");
        let mut attrs = NodeAttrs::new("r");
        op.parse_attrs(&mut attrs).unwrap();
        assert!(attrs.parsed.is_none());
    }
}
