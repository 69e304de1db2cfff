use std::time::Instant;

use log::{debug, info};

use crate::{
    OrchestratorError, Result,
    configs::{ContextConfig, GraphConfig},
    graph::{GraphBuilder, GraphId},
};

/// An authenticated orchestration session.
///
/// Every graph is declared through a context and can only be activated and executed
/// with the context that declared it.
#[derive(Debug)]
pub struct Context {
    id: u64,
    config: ContextConfig,
    graphs: u64,
    executions: u64,
    started: Instant,
}

impl Context {
    /// Initializes a new `Context`.
    ///
    /// # Arguments
    /// * `config` - The credentials of the session.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the username or the token is empty.
    pub fn initialize(config: ContextConfig) -> Result<Self> {
        config.validate()?;

        let ctx = Self {
            id: rand::random(),
            config,
            graphs: 0,
            executions: 0,
            started: Instant::now(),
        };

        info!(user:% = ctx.config.username, context = ctx.id; "context initialized");
        Ok(ctx)
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    /// The amount of graphs declared so far.
    pub fn graphs(&self) -> u64 {
        self.graphs
    }

    /// The amount of graphs executed so far.
    pub fn executions(&self) -> u64 {
        self.executions
    }

    /// Starts declaring a new graph.
    ///
    /// # Arguments
    /// * `config` - The graph's name, algorithm and evaluation approach.
    ///
    /// # Returns
    /// A builder in the declare phase, or `InvalidConfig` if the graph's name is empty or
    /// holds a NUL byte.
    pub fn graph(&mut self, config: GraphConfig) -> Result<GraphBuilder> {
        if config.name.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "graph name must not be empty".into(),
            ));
        }
        if config.name.contains('\0') {
            return Err(OrchestratorError::InvalidConfig(format!(
                "graph name {:?} contains a NUL byte",
                config.name
            )));
        }

        let id = GraphId::new(self.id, self.graphs);
        self.graphs += 1;

        debug!(graph:% = config.name, algorithm:% = config.algorithm, id:% = id; "declaring graph");
        Ok(GraphBuilder::new(id, config))
    }

    /// Ends the session, logging what it did.
    pub fn end(self) {
        info!(
            user:% = self.config.username,
            graphs = self.graphs,
            executions = self.executions,
            elapsed:? = self.started.elapsed();
            "context ended"
        );
    }

    pub(crate) fn check_owns(&self, graph: GraphId) -> Result<()> {
        if graph.context() != self.id {
            return Err(OrchestratorError::ForeignNode {
                expected: GraphId::new(self.id, graph.index()),
                got: graph,
            });
        }
        Ok(())
    }

    pub(crate) fn record_execution(&mut self) {
        self.executions += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::initialize(ContextConfig::new("ada", "token")).unwrap()
    }

    #[test]
    fn empty_credentials_fail_to_initialize() {
        assert!(Context::initialize(ContextConfig::new("", "token")).is_err());
        assert!(Context::initialize(ContextConfig::new("ada", "")).is_err());
    }

    #[test]
    fn graphs_get_distinct_ids() {
        let mut ctx = ctx();
        let a = ctx.graph(GraphConfig::new("a", "cnn")).unwrap();
        let b = ctx.graph(GraphConfig::new("b", "cnn")).unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(ctx.graphs(), 2);
    }

    #[test]
    fn unnamed_graphs_are_rejected() {
        assert!(ctx().graph(GraphConfig::new(" ", "cnn")).is_err());
    }

    #[test]
    fn names_with_nul_bytes_are_rejected() {
        let mut ctx = ctx();
        assert!(matches!(
            ctx.graph(GraphConfig::new("cnn\0eval", "cnn")),
            Err(OrchestratorError::InvalidConfig(_))
        ));
        assert_eq!(ctx.graphs(), 0);
    }

    #[test]
    fn graphs_of_other_contexts_are_foreign() {
        let mut ours = ctx();
        let theirs = ctx();
        let builder = ours.graph(GraphConfig::new("g", "cnn")).unwrap();

        assert!(ours.check_owns(builder.id()).is_ok());
        assert!(theirs.check_owns(builder.id()).is_err());
    }
}
