use std::{
    any::Any,
    collections::HashMap,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use ndarray::ArrayD;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{GraphId, NodeId, Results, node::Node};
use crate::{Approach, GraphConfig, OrchestratorError, Result};

/// The progress of an ongoing execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    Started { nodes: usize, levels: usize },
    NodeEvaluated { node: NodeId, op: String },
    LevelFinished { level: usize, nodes: usize, elapsed: Duration },
    Finished { elapsed: Duration },
    Failed { node: NodeId, op: String, msg: String },
}

/// A graph being evaluated in the background.
#[derive(Debug)]
pub struct Execution {
    id: GraphId,
    name: String,
    handle: JoinHandle<Result<Vec<ArrayD<f32>>>>,
    events: UnboundedReceiver<ExecutionEvent>,
}

impl Execution {
    pub(crate) fn spawn(
        id: GraphId,
        config: GraphConfig,
        nodes: Vec<Node>,
        levels: Vec<Vec<usize>>,
        feeds: HashMap<usize, ArrayD<f32>>,
    ) -> Result<Self> {
        let pool = match config.approach {
            Approach::Local => None,
            Approach::Distributed { workers } => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(workers.get())
                    .thread_name(|i| format!("graph-worker-{i}"))
                    .build()
                    .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;
                Some(pool)
            }
        };

        let (tx, events) = mpsc::unbounded_channel();
        let evaluator = Evaluator {
            id,
            nodes,
            levels,
            feeds,
            events: tx,
        };

        let handle = thread::Builder::new()
            .name(format!("graph-{id}"))
            .spawn(move || evaluator.run(pool.as_ref()))?;

        Ok(Self {
            id,
            name: config.name,
            handle,
            events,
        })
    }

    /// Logs every progress event until the execution ends.
    pub fn track_progress(self) -> Result<Results> {
        self.track_progress_with(|event| match event {
            ExecutionEvent::Started { nodes, levels } => {
                info!(nodes = *nodes, levels = *levels; "execution started")
            }
            ExecutionEvent::NodeEvaluated { node, op } => {
                debug!(node = node.index(), op:% = op; "node evaluated")
            }
            ExecutionEvent::LevelFinished {
                level,
                nodes,
                elapsed,
            } => info!(level = *level, nodes = *nodes, elapsed:? = elapsed; "level finished"),
            ExecutionEvent::Finished { elapsed } => {
                info!(elapsed:? = elapsed; "execution finished")
            }
            ExecutionEvent::Failed { node, op, msg } => {
                warn!(node = node.index(), op:% = op, msg:% = msg; "execution failed")
            }
        })
    }

    /// Hands every progress event to `on_event` until the execution ends.
    ///
    /// # Returns
    /// The value of every node, or the error that stopped the evaluation.
    pub fn track_progress_with<F>(mut self, mut on_event: F) -> Result<Results>
    where
        F: FnMut(&ExecutionEvent),
    {
        while let Some(event) = self.events.blocking_recv() {
            on_event(&event);
        }
        self.wait()
    }

    /// Blocks until the execution ends, ignoring its progress.
    pub fn wait(self) -> Result<Results> {
        let Self { id, name, handle, .. } = self;

        let values = handle
            .join()
            .map_err(|panic| OrchestratorError::ExecutorPanicked(panic_message(&*panic)))??;

        debug!(graph:% = name, nodes = values.len(); "execution joined");
        Ok(Results::new(id, values))
    }
}

struct Evaluator {
    id: GraphId,
    nodes: Vec<Node>,
    levels: Vec<Vec<usize>>,
    feeds: HashMap<usize, ArrayD<f32>>,
    events: UnboundedSender<ExecutionEvent>,
}

impl Evaluator {
    fn run(mut self, pool: Option<&ThreadPool>) -> Result<Vec<ArrayD<f32>>> {
        let start = Instant::now();
        self.send(ExecutionEvent::Started {
            nodes: self.nodes.len(),
            levels: self.levels.len(),
        });

        let mut values: Vec<Option<ArrayD<f32>>> = vec![None; self.nodes.len()];
        let levels = std::mem::take(&mut self.levels);

        for (level, indices) in levels.iter().enumerate() {
            let level_start = Instant::now();

            let evaluated = match pool {
                Some(pool) => pool.install(|| {
                    indices
                        .par_iter()
                        .map(|&i| (i, self.evaluate(i, &values)))
                        .collect::<Vec<_>>()
                }),
                None => {
                    let mut evaluated = Vec::with_capacity(indices.len());
                    for &i in indices {
                        let value = self.evaluate(i, &values);
                        let failed = value.is_err();
                        evaluated.push((i, value));
                        if failed {
                            break;
                        }
                    }
                    evaluated
                }
            };

            for (i, value) in evaluated {
                let node = NodeId::new(self.id, i);
                let op = self.nodes[i].op.name().to_string();

                match value {
                    Ok(value) => {
                        values[i] = Some(value);
                        self.send(ExecutionEvent::NodeEvaluated { node, op });
                    }
                    Err(msg) => {
                        self.send(ExecutionEvent::Failed {
                            node,
                            op: op.clone(),
                            msg: msg.clone(),
                        });
                        return Err(OrchestratorError::OpFailed { node: i, op, msg });
                    }
                }
            }

            self.send(ExecutionEvent::LevelFinished {
                level,
                nodes: indices.len(),
                elapsed: level_start.elapsed(),
            });
        }

        self.send(ExecutionEvent::Finished {
            elapsed: start.elapsed(),
        });

        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                value.ok_or_else(|| OrchestratorError::OpFailed {
                    node: i,
                    op: self.nodes[i].op.name().to_string(),
                    msg: "node was never evaluated".into(),
                })
            })
            .collect()
    }

    fn evaluate(
        &self,
        index: usize,
        values: &[Option<ArrayD<f32>>],
    ) -> std::result::Result<ArrayD<f32>, String> {
        let node = &self.nodes[index];

        if let Some(fed) = self.feeds.get(&index) {
            return Ok(fed.clone());
        }

        let inputs = node
            .inputs
            .iter()
            .map(|&i| {
                values[i]
                    .as_ref()
                    .ok_or_else(|| format!("input node {i} has no value"))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        node.op.eval(&inputs)
    }

    fn send(&self, event: ExecutionEvent) {
        // Nobody listening is not an error; the results are still joined.
        let _ = self.events.send(event);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
