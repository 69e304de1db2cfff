use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// How the levels of an activated graph are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Approach {
    /// Every node is evaluated on the execution thread, one after the other.
    #[default]
    Local,
    /// The nodes of each level are evaluated in parallel on a pool of `workers` threads.
    Distributed { workers: NonZeroUsize },
}

/// Describes a graph before it is declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub name: String,
    pub algorithm: String,
    #[serde(default)]
    pub approach: Approach,
}

impl GraphConfig {
    /// Creates a new `GraphConfig` evaluated with the local approach.
    pub fn new<N, A>(name: N, algorithm: A) -> Self
    where
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            name: name.into(),
            algorithm: algorithm.into(),
            approach: Approach::Local,
        }
    }

    pub fn with_approach(mut self, approach: Approach) -> Self {
        self.approach = approach;
        self
    }
}
