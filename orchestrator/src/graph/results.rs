use ndarray::ArrayD;

use super::{GraphId, NodeId};
use crate::{OrchestratorError, Result};

/// The value of every node of an executed graph.
#[derive(Debug, Clone)]
pub struct Results {
    graph: GraphId,
    values: Vec<ArrayD<f32>>,
}

impl Results {
    pub(crate) fn new(graph: GraphId, values: Vec<ArrayD<f32>>) -> Self {
        Self { graph, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value of `node`.
    ///
    /// # Errors
    /// Returns `ForeignNode` if `node` belongs to another graph.
    pub fn get(&self, node: NodeId) -> Result<&ArrayD<f32>> {
        if node.graph() != self.graph {
            return Err(OrchestratorError::ForeignNode {
                expected: self.graph,
                got: node.graph(),
            });
        }

        self.values
            .get(node.index())
            .ok_or(OrchestratorError::ForeignNode {
                expected: self.graph,
                got: node.graph(),
            })
    }

    /// The value of `node` as a single scalar.
    ///
    /// # Errors
    /// Returns `NotScalar` if the value holds more or less than one element.
    pub fn scalar(&self, node: NodeId) -> Result<f32> {
        let value = self.get(node)?;
        match value.iter().next() {
            Some(&v) if value.len() == 1 => Ok(v),
            _ => Err(OrchestratorError::NotScalar {
                node: node.index(),
                shape: value.shape().to_vec(),
            }),
        }
    }
}
