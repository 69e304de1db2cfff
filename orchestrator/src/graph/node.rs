use std::fmt;

use super::Op;

/// Identifies a graph among every graph declared by every context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId {
    context: u64,
    index: u64,
}

impl GraphId {
    pub(crate) fn new(context: u64, index: u64) -> Self {
        Self { context, index }
    }

    pub(crate) fn context(&self) -> u64 {
        self.context
    }

    pub(crate) fn index(&self) -> u64 {
        self.index
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}/{}", self.context, self.index)
    }
}

/// A handle to a node of a declared graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    graph: GraphId,
    index: usize,
}

impl NodeId {
    pub(crate) fn new(graph: GraphId, index: usize) -> Self {
        Self { graph, index }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// The position of the node in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub op: Op,
    pub inputs: Vec<usize>,
    /// Nodes that must be evaluated before this one without feeding it.
    pub after: Vec<usize>,
}

impl Node {
    /// Every node this one depends on, data and control edges alike.
    pub fn dependencies(&self) -> impl Iterator<Item = usize> + '_ {
        self.inputs.iter().chain(&self.after).copied()
    }
}
