mod active;
mod builder;
mod execution;
mod node;
mod op;
mod results;

pub use active::ActiveGraph;
pub use builder::GraphBuilder;
pub use execution::{Execution, ExecutionEvent};
pub use node::{GraphId, NodeId};
pub use op::{Op, OpFn};
pub use results::Results;
