pub mod insert_copy;

use std::time::Instant;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
    attrs::AttrError,
    graph::{Graph, GraphError},
    op::{OpError, OpRegistry},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassError {
    #[error("Graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Op: {0}")]
    Op(#[from] OpError),

    #[error("Attr: {0}")]
    Attr(#[from] AttrError),

    #[error("Pass '{0}' is not registered")]
    UnknownPass(String),

    #[error("Pass '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Pass '{pass}' requires graph attribute '{attr}'")]
    MissingGraphAttr { pass: String, attr: String },
}

pub type PassFn = fn(Graph, &OpRegistry) -> Result<Graph, PassError>;

#[derive(Clone)]
pub struct PassInfo {
    pub name: String,
    pub description: String,
    pub body: PassFn,
    /// Whether the pass changes the node/edge structure.
    /// Any derived view (e.g. an `IndexedGraph`) must be rebuilt afterwards.
    pub change_graph: bool,
    pub depend_graph_attrs: Vec<String>,
    pub provide_graph_attrs: Vec<String>,
}

impl std::fmt::Debug for PassInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassInfo")
            .field("name", &self.name)
            .field("change_graph", &self.change_graph)
            .field("depend_graph_attrs", &self.depend_graph_attrs)
            .field("provide_graph_attrs", &self.provide_graph_attrs)
            .finish()
    }
}

impl PassInfo {
    pub fn new(name: impl Into<String>, body: PassFn) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            body,
            change_graph: false,
            depend_graph_attrs: vec![],
            provide_graph_attrs: vec![],
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn set_change_graph(mut self, change_graph: bool) -> Self {
        self.change_graph = change_graph;
        self
    }

    pub fn depend_graph_attr(mut self, key: impl Into<String>) -> Self {
        self.depend_graph_attrs.push(key.into());
        self
    }

    pub fn provide_graph_attr(mut self, key: impl Into<String>) -> Self {
        self.provide_graph_attrs.push(key.into());
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct PassRegistry {
    passes: FxHashMap<String, PassInfo>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_passes() -> Self {
        let mut registry = Self::new();
        let pass = insert_copy::pass_info();
        registry.passes.insert(pass.name.clone(), pass);
        registry
    }

    pub fn register(&mut self, pass: PassInfo) -> Result<(), PassError> {
        if self.passes.contains_key(&pass.name) {
            return Err(PassError::AlreadyRegistered(pass.name));
        }
        self.passes.insert(pass.name.clone(), pass);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&PassInfo, PassError> {
        self.passes
            .get(name)
            .ok_or_else(|| PassError::UnknownPass(name.to_string()))
    }

    pub fn apply_pass(
        &self,
        graph: Graph,
        name: &str,
        ops: &OpRegistry,
    ) -> Result<Graph, PassError> {
        let pass = self.get(name)?;
        if let Some(attr) = pass
            .depend_graph_attrs
            .iter()
            .find(|attr| !graph.attrs.contains(attr))
        {
            return Err(PassError::MissingGraphAttr {
                pass: pass.name.clone(),
                attr: attr.clone(),
            });
        }

        let start = Instant::now();
        let graph = (pass.body)(graph, ops)?;
        log::debug!(
            "{} (change_graph={}): {:?}",
            pass.name,
            pass.change_graph,
            start.elapsed()
        );

        Ok(graph)
    }

    /// Runs `names` in order. The first failing pass aborts the sequence.
    pub fn apply_passes(
        &self,
        mut graph: Graph,
        names: &[&str],
        ops: &OpRegistry,
    ) -> Result<Graph, PassError> {
        for name in names {
            graph = self.apply_pass(graph, name, ops)?;
        }
        Ok(graph)
    }
}
