pub mod configs;
mod context;
pub mod error;
pub mod graph;

pub use configs::{Approach, ContextConfig, GraphConfig};
pub use context::Context;
pub use error::{OrchestratorError, Result};
pub use graph::{
    ActiveGraph, Execution, ExecutionEvent, GraphBuilder, GraphId, NodeId, Op, OpFn, Results,
};
