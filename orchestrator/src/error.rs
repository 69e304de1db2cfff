use std::fmt;

use crate::graph::GraphId;

/// The result type used across the orchestrator.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can occur in the orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before anything runs.
    InvalidConfig(String),
    /// A node id or graph was handed to a graph or context that did not issue it.
    ForeignNode { expected: GraphId, got: GraphId },
    /// An operation was declared with the wrong amount of inputs.
    Arity {
        op: String,
        expected: usize,
        got: usize,
    },
    /// Two placeholders were declared under the same name.
    DuplicatePlaceholder(String),
    /// The dependency edges of a graph form a cycle.
    Cycle { graph: String, nodes: Vec<usize> },
    /// A placeholder was not fed.
    MissingFeed(String),
    /// A feed names no placeholder of the graph.
    UnknownFeed(String),
    /// A placeholder was fed more than once.
    DuplicateFeed(String),
    /// An operation failed while evaluating the graph.
    OpFailed {
        node: usize,
        op: String,
        msg: String,
    },
    /// The evaluation thread panicked.
    ExecutorPanicked(String),
    /// A node's value is not a single scalar.
    NotScalar { node: usize, shape: Vec<usize> },
    /// An underlying I/O error not covered by the above variants.
    Io(std::io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::ForeignNode { expected, got } => {
                write!(f, "expected a node of graph {expected}, got one of graph {got}")
            }
            Self::Arity { op, expected, got } => {
                write!(f, "{op} takes {expected} input(s), got {got}")
            }
            Self::DuplicatePlaceholder(name) => {
                write!(f, "placeholder {name:?} is declared more than once")
            }
            Self::Cycle { graph, nodes } => {
                write!(f, "graph {graph:?} has a cycle through nodes {nodes:?}")
            }
            Self::MissingFeed(name) => write!(f, "placeholder {name:?} was not fed"),
            Self::UnknownFeed(name) => write!(f, "no placeholder is named {name:?}"),
            Self::DuplicateFeed(name) => write!(f, "placeholder {name:?} was fed more than once"),
            Self::OpFailed { node, op, msg } => write!(f, "node {node} ({op}) failed: {msg}"),
            Self::ExecutorPanicked(msg) => write!(f, "the executor panicked: {msg}"),
            Self::NotScalar { node, shape } => {
                write!(f, "node {node} holds a tensor of shape {shape:?}, not a scalar")
            }
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
