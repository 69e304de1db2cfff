mod context;
mod graph;

pub use context::ContextConfig;
pub use graph::{Approach, GraphConfig};
