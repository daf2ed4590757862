//! Component-add pipeline
//!
//! A task graph of five stages driven by the coordinator. Each stage runs
//! only after its predecessor succeeds.

pub mod coordinator;
pub mod graph;
pub mod stages;

use thiserror::Error;

use crate::domain::{ComponentKey, StageName};
use crate::services::deploy::DeployError;

pub use coordinator::{Coordinator, PipelineHandle, PipelineReport};
pub use graph::{GraphError, GraphExecutor, NodeState, Stage, StageObserver, TaskGraph};
pub use stages::{component_pipeline, StageContext, StageOutput};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {source}")]
    StageFailure {
        stage: StageName,
        #[source]
        source: DeployError,
    },

    #[error("Pipeline cancelled before stage {stage}")]
    Cancelled { stage: StageName },

    #[error("A pipeline for {0} is already running")]
    AlreadyRunning(ComponentKey),

    #[error("Pipeline task aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl PipelineError {
    /// Stage the pipeline stopped at, if any
    pub fn stage(&self) -> Option<StageName> {
        match self {
            PipelineError::StageFailure { stage, .. } | PipelineError::Cancelled { stage } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}
