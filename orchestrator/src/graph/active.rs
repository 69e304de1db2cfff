use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info};
use ndarray::ArrayD;

use super::{Execution, GraphId, node::Node};
use crate::{Context, GraphConfig, OrchestratorError, Result};

/// A graph whose nodes have been ordered into levels, ready to be executed once.
///
/// Every node of a level depends only on nodes of earlier levels, so the nodes of a level
/// can be evaluated in any order, or all at once.
#[derive(Debug)]
pub struct ActiveGraph {
    id: GraphId,
    config: GraphConfig,
    nodes: Vec<Node>,
    placeholders: HashMap<String, usize>,
    levels: Vec<Vec<usize>>,
}

impl ActiveGraph {
    pub(crate) fn new(
        id: GraphId,
        config: GraphConfig,
        nodes: Vec<Node>,
        placeholders: HashMap<String, usize>,
    ) -> Result<Self> {
        let levels = levels(&nodes).map_err(|nodes| OrchestratorError::Cycle {
            graph: config.name.clone(),
            nodes,
        })?;

        info!(
            graph:% = config.name,
            nodes = nodes.len(),
            levels = levels.len();
            "graph activated"
        );

        Ok(Self {
            id,
            config,
            nodes,
            placeholders,
            levels,
        })
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node indices of every level, in evaluation order.
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    /// Starts evaluating the graph on a background thread.
    ///
    /// # Arguments
    /// * `ctx` - The context that declared this graph.
    /// * `feeds` - The value of every placeholder, keyed by its name.
    ///
    /// # Errors
    /// * `ForeignNode` if `ctx` did not declare this graph.
    /// * `MissingFeed`, `UnknownFeed` or `DuplicateFeed` if the feeds do not provide
    ///   every placeholder exactly once.
    /// * `InvalidConfig` if the worker pool cannot be built.
    /// * `Io` if the evaluation thread cannot be spawned.
    pub fn execute<I, S>(self, ctx: &mut Context, feeds: I) -> Result<Execution>
    where
        I: IntoIterator<Item = (S, ArrayD<f32>)>,
        S: Into<String>,
    {
        ctx.check_owns(self.id)?;

        let mut fed = HashMap::with_capacity(self.placeholders.len());
        for (name, value) in feeds {
            let name = name.into();
            let Some(&index) = self.placeholders.get(&name) else {
                return Err(OrchestratorError::UnknownFeed(name));
            };
            if fed.insert(index, value).is_some() {
                return Err(OrchestratorError::DuplicateFeed(name));
            }
        }

        let mut missing: Vec<_> = self
            .placeholders
            .iter()
            .filter(|&(_, index)| !fed.contains_key(index))
            .map(|(name, _)| name)
            .collect();
        missing.sort();
        if let Some(name) = missing.first() {
            return Err(OrchestratorError::MissingFeed(name.to_string()));
        }

        ctx.record_execution();
        debug!(graph:% = self.config.name, feeds = fed.len(); "executing graph");

        Execution::spawn(self.id, self.config, self.nodes, self.levels, fed)
    }
}

/// Groups the nodes into Kahn levels.
///
/// # Returns
/// The levels, or the sorted indices of the nodes left unordered by a cycle.
fn levels(nodes: &[Node]) -> std::result::Result<Vec<Vec<usize>>, Vec<usize>> {
    let mut dependents = vec![Vec::new(); nodes.len()];
    let mut in_degree = vec![0usize; nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        let deps: HashSet<_> = node.dependencies().collect();
        in_degree[i] = deps.len();
        for dep in deps {
            dependents[dep].push(i);
        }
    }

    let mut frontier: VecDeque<_> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut levels = Vec::new();
    let mut ordered = 0;

    while !frontier.is_empty() {
        let mut level: Vec<_> = frontier.drain(..).collect();
        level.sort_unstable();
        ordered += level.len();

        for &i in &level {
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    frontier.push_back(dependent);
                }
            }
        }

        levels.push(level);
    }

    if ordered < nodes.len() {
        let stuck = (0..nodes.len()).filter(|&i| in_degree[i] > 0).collect();
        return Err(stuck);
    }

    Ok(levels)
}
