//! Stage dependency graph and scheduler
//!
//! A node starts only once every declared predecessor has succeeded. Nodes
//! behind a failed node are skipped; once cancelled, nodes that have not
//! started are withdrawn while running nodes finish normally.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::StageName;
use crate::services::deploy::DeployError;

use super::stages::{StageContext, StageOutput};

/// One unit of work in the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// Run with the outputs of this node's predecessors, in declaration order
    async fn run(
        &self,
        ctx: &StageContext,
        inputs: &[StageOutput],
    ) -> Result<StageOutput, DeployError>;
}

pub type BoxedStage = Box<dyn Stage>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Stage {0} is registered twice")]
    Duplicate(StageName),

    #[error("Stage {stage} depends on unregistered stage {missing}")]
    UnknownPredecessor {
        stage: StageName,
        missing: StageName,
    },
}

struct GraphNode {
    stage: BoxedStage,
    after: Vec<StageName>,
}

impl GraphNode {
    fn name(&self) -> StageName {
        self.stage.name()
    }
}

/// Directed acyclic graph of stages
///
/// Predecessors must be registered before their dependents, which keeps the
/// graph acyclic by construction.
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<GraphNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, stage: BoxedStage, after: &[StageName]) -> Result<(), GraphError> {
        let name = stage.name();
        if self.contains(name) {
            return Err(GraphError::Duplicate(name));
        }
        if let Some(missing) = after.iter().find(|p| !self.contains(**p)) {
            return Err(GraphError::UnknownPredecessor {
                stage: name,
                missing: *missing,
            });
        }

        self.nodes.push(GraphNode {
            stage,
            after: after.to_vec(),
        });
        Ok(())
    }

    /// Strict linear chain: each stage depends only on the one before it
    pub fn chain(stages: Vec<BoxedStage>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        let mut previous: Option<StageName> = None;
        for stage in stages {
            let name = stage.name();
            let after: Vec<StageName> = previous.into_iter().collect();
            graph.add(stage, &after)?;
            previous = Some(name);
        }
        Ok(graph)
    }

    pub fn contains(&self, name: StageName) -> bool {
        self.nodes.iter().any(|n| n.name() == name)
    }

    pub fn predecessors(&self, name: StageName) -> Option<&[StageName]> {
        self.nodes
            .iter()
            .find(|n| n.name() == name)
            .map(|n| n.after.as_slice())
    }

    pub fn stage_names(&self) -> Vec<StageName> {
        self.nodes.iter().map(GraphNode::name).collect()
    }
}

/// Final state of one node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Succeeded,
    Failed,
    /// A predecessor did not succeed
    Skipped,
    /// Cancelled before it started
    Withdrawn,
}

/// Receives stage transitions as the scheduler makes them
#[async_trait]
pub trait StageObserver: Send + Sync {
    async fn started(&self, stage: StageName);
    async fn finished(&self, stage: StageName, error: Option<&DeployError>);
    async fn skipped(&self, stage: StageName, blocked_by: StageName);
    async fn withdrawn(&self, stage: StageName);
}

/// Result of running a graph
pub struct GraphRun {
    order: Vec<StageName>,
    states: HashMap<StageName, NodeState>,
    outputs: HashMap<StageName, StageOutput>,
    failures: Vec<(StageName, DeployError)>,
}

impl GraphRun {
    pub fn state(&self, stage: StageName) -> Option<NodeState> {
        self.states.get(&stage).copied()
    }

    pub fn output(&self, stage: StageName) -> Option<&StageOutput> {
        self.outputs.get(&stage)
    }

    /// First node (in registration order) that was withdrawn
    pub fn first_withdrawn(&self) -> Option<StageName> {
        self.order
            .iter()
            .copied()
            .find(|name| self.state(*name) == Some(NodeState::Withdrawn))
    }

    /// Take the first recorded failure
    pub fn take_failure(&mut self) -> Option<(StageName, DeployError)> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self.failures.remove(0))
        }
    }
}

/// Runs a task graph
pub struct GraphExecutor;

impl GraphExecutor {
    pub async fn run(
        graph: TaskGraph,
        ctx: &StageContext,
        cancel: &CancellationToken,
        observer: &dyn StageObserver,
    ) -> GraphRun {
        let order = graph.stage_names();
        let mut states: HashMap<StageName, NodeState> = HashMap::new();
        let mut outputs: HashMap<StageName, StageOutput> = HashMap::new();
        let mut failures = Vec::new();
        let mut pending = graph.nodes;

        loop {
            // Skip everything behind a node that did not succeed, transitively
            loop {
                let (blocked, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|node| {
                    node.after.iter().any(|p| {
                        matches!(
                            states.get(p),
                            Some(NodeState::Failed | NodeState::Skipped | NodeState::Withdrawn)
                        )
                    })
                });
                pending = rest;
                if blocked.is_empty() {
                    break;
                }
                for node in blocked {
                    let blocker = node
                        .after
                        .iter()
                        .copied()
                        .find(|p| states.get(p) != Some(&NodeState::Succeeded))
                        .unwrap_or(node.name());
                    debug!(
                        key = %ctx.key,
                        stage = %node.name(),
                        blocked_by = %blocker,
                        "Stage skipped"
                    );
                    observer.skipped(node.name(), blocker).await;
                    states.insert(node.name(), NodeState::Skipped);
                }
            }

            let (ready, waiting): (Vec<_>, Vec<_>) = pending.into_iter().partition(|node| {
                node.after
                    .iter()
                    .all(|p| states.get(p) == Some(&NodeState::Succeeded))
            });
            pending = waiting;

            if ready.is_empty() {
                break;
            }

            if cancel.is_cancelled() {
                warn!(key = %ctx.key, "Pipeline cancelled, withdrawing pending stages");
                for node in ready.iter().chain(pending.iter()) {
                    observer.withdrawn(node.name()).await;
                    states.insert(node.name(), NodeState::Withdrawn);
                }
                pending = Vec::new();
                break;
            }

            let runs = ready.iter().map(|node| {
                let inputs: Vec<StageOutput> = node
                    .after
                    .iter()
                    .filter_map(|p| outputs.get(p).cloned())
                    .collect();
                async move {
                    observer.started(node.name()).await;
                    let result = node.stage.run(ctx, &inputs).await;
                    (node.name(), result)
                }
            });
            let results = join_all(runs).await;

            for (name, result) in results {
                match result {
                    Ok(output) => {
                        observer.finished(name, None).await;
                        outputs.insert(name, output);
                        states.insert(name, NodeState::Succeeded);
                    }
                    Err(e) => {
                        observer.finished(name, Some(&e)).await;
                        states.insert(name, NodeState::Failed);
                        failures.push((name, e));
                    }
                }
            }
        }

        // Unreachable for graphs built through `add`, kept so every node has a state
        for node in pending {
            states.insert(node.name(), NodeState::Skipped);
        }

        GraphRun {
            order,
            states,
            outputs,
            failures,
        }
    }
}
