use std::collections::HashMap;

use log::debug;
use ndarray::ArrayD;

use super::{
    ActiveGraph, GraphId, NodeId, Op,
    node::Node,
};
use crate::{Context, GraphConfig, OrchestratorError, Result};

/// Accumulates the nodes and edges of a graph during the declare phase.
///
/// Nothing is evaluated while declaring: every method only records an operation and hands
/// back the id of the node holding its future value.
#[derive(Debug)]
pub struct GraphBuilder {
    id: GraphId,
    config: GraphConfig,
    nodes: Vec<Node>,
    placeholders: HashMap<String, usize>,
}

impl GraphBuilder {
    pub(crate) fn new(id: GraphId, config: GraphConfig) -> Self {
        Self {
            id,
            config,
            nodes: Vec::new(),
            placeholders: HashMap::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The amount of nodes declared so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declares a node applying `op` to `inputs`.
    ///
    /// # Arguments
    /// * `op` - The operation of the node.
    /// * `inputs` - The nodes whose values feed the operation, in order.
    ///
    /// # Errors
    /// * `ForeignNode` if an input belongs to another graph.
    /// * `Arity` if the amount of inputs differs from what `op` takes.
    /// * `DuplicatePlaceholder` if `op` is a placeholder whose name is taken.
    /// * `InvalidConfig` if the operation's arguments are invalid.
    pub fn op(&mut self, op: Op, inputs: &[NodeId]) -> Result<NodeId> {
        let inputs = inputs
            .iter()
            .map(|&id| self.check(id))
            .collect::<Result<Vec<_>>>()?;

        if inputs.len() != op.arity() {
            return Err(OrchestratorError::Arity {
                op: op.name().to_string(),
                expected: op.arity(),
                got: inputs.len(),
            });
        }

        op.validate().map_err(OrchestratorError::InvalidConfig)?;

        let index = self.nodes.len();
        if let Op::Placeholder(name) = &op {
            if self.placeholders.contains_key(name) {
                return Err(OrchestratorError::DuplicatePlaceholder(name.clone()));
            }
            self.placeholders.insert(name.clone(), index);
        }

        debug!(graph:% = self.config.name, node = index, op:? = op; "declared node");
        self.nodes.push(Node {
            op,
            inputs,
            after: Vec::new(),
        });

        Ok(NodeId::new(self.id, index))
    }

    pub fn constant(&mut self, value: ArrayD<f32>) -> Result<NodeId> {
        self.op(Op::Constant(value), &[])
    }

    /// Declares a named input whose value is provided when executing the graph.
    pub fn placeholder<N: Into<String>>(&mut self, name: N) -> Result<NodeId> {
        self.op(Op::Placeholder(name.into()), &[])
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.op(Op::Add, &[a, b])
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.op(Op::Sub, &[a, b])
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.op(Op::Mul, &[a, b])
    }

    pub fn div(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.op(Op::Div, &[a, b])
    }

    pub fn scale(&mut self, x: NodeId, factor: f32) -> Result<NodeId> {
        self.op(Op::Scale(factor), &[x])
    }

    pub fn neg(&mut self, x: NodeId) -> Result<NodeId> {
        self.op(Op::Neg, &[x])
    }

    pub fn matmul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.op(Op::MatMul, &[a, b])
    }

    /// Reverses the axes of `x`.
    pub fn transpose(&mut self, x: NodeId) -> Result<NodeId> {
        self.op(Op::Transpose, &[x])
    }

    pub fn reshape(&mut self, x: NodeId, shape: Vec<usize>) -> Result<NodeId> {
        self.op(Op::Reshape(shape), &[x])
    }

    pub fn exp(&mut self, x: NodeId) -> Result<NodeId> {
        self.op(Op::Exp, &[x])
    }

    pub fn log(&mut self, x: NodeId) -> Result<NodeId> {
        self.op(Op::Log, &[x])
    }

    pub fn relu(&mut self, x: NodeId) -> Result<NodeId> {
        self.op(Op::Relu, &[x])
    }

    pub fn sigmoid(&mut self, x: NodeId) -> Result<NodeId> {
        self.op(Op::Sigmoid, &[x])
    }

    pub fn clip(&mut self, x: NodeId, min: f32, max: f32) -> Result<NodeId> {
        self.op(Op::Clip { min, max }, &[x])
    }

    /// Softmax over the last axis of `x`.
    pub fn softmax(&mut self, x: NodeId) -> Result<NodeId> {
        self.op(Op::Softmax, &[x])
    }

    pub fn sum(&mut self, x: NodeId, axis: Option<usize>) -> Result<NodeId> {
        self.op(Op::Sum { axis }, &[x])
    }

    pub fn mean(&mut self, x: NodeId, axis: Option<usize>) -> Result<NodeId> {
        self.op(Op::Mean { axis }, &[x])
    }

    pub fn argmax(&mut self, x: NodeId, axis: usize) -> Result<NodeId> {
        self.op(Op::Argmax { axis }, &[x])
    }

    /// Element-wise equality, `1.0` where both operands match and `0.0` elsewhere.
    pub fn equal(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.op(Op::Equal, &[a, b])
    }

    /// Declares an opaque operation evaluated by `func`.
    pub fn custom<N, F>(&mut self, name: N, inputs: &[NodeId], func: F) -> Result<NodeId>
    where
        N: Into<String>,
        F: Fn(&[&ArrayD<f32>]) -> std::result::Result<ArrayD<f32>, String> + Send + Sync + 'static,
    {
        self.op(Op::custom(name, inputs.len(), func), inputs)
    }

    /// Orders `node` after `before` without passing it any value.
    ///
    /// # Errors
    /// Returns `ForeignNode` if either node belongs to another graph.
    pub fn after(&mut self, before: NodeId, node: NodeId) -> Result<()> {
        let before = self.check(before)?;
        let node = self.check(node)?;

        let after = &mut self.nodes[node].after;
        if !after.contains(&before) {
            after.push(before);
        }
        Ok(())
    }

    /// Ends the declare phase, ordering the graph's nodes into dependency levels.
    ///
    /// # Arguments
    /// * `ctx` - The context that declared this graph.
    ///
    /// # Errors
    /// * `ForeignNode` if `ctx` did not declare this graph.
    /// * `Cycle` if the control edges form a cycle.
    pub fn activate(self, ctx: &Context) -> Result<ActiveGraph> {
        ctx.check_owns(self.id)?;
        ActiveGraph::new(self.id, self.config, self.nodes, self.placeholders)
    }

    fn check(&self, id: NodeId) -> Result<usize> {
        if id.graph() != self.id {
            return Err(OrchestratorError::ForeignNode {
                expected: self.id,
                got: id.graph(),
            });
        }
        Ok(id.index())
    }
}
