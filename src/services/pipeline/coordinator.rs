//! Pipeline coordinator
//!
//! Starts one pipeline per component key, tracks its cancellation token and
//! records stage transitions into the pipeline store.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{
    ComponentKey, ComponentStatus, DeploymentSpec, InstanceComponent, PipelineRecord,
    PipelineStatus, StageName,
};
use crate::infra::RecordStore;
use crate::services::deploy::{DeployError, Deployer};
use crate::services::scripts::ScriptRunner;
use crate::state::PipelineStore;

use super::graph::{GraphExecutor, NodeState, StageObserver, TaskGraph};
use super::stages::{component_pipeline, StageContext};
use super::PipelineError;

/// Outcome of a successful pipeline
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub id: String,
    pub key: ComponentKey,
    pub instance_component: InstanceComponent,
    pub deployment: Option<DeploymentSpec>,
}

/// Handle to a started pipeline
pub struct PipelineHandle {
    pub id: String,
    pub key: ComponentKey,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<PipelineReport, PipelineError>>,
}

impl PipelineHandle {
    /// Withdraw every stage that has not started yet
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub async fn wait(self) -> Result<PipelineReport, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Aborted(e.to_string()))?
    }
}

struct RunningPipeline {
    pipeline_id: String,
    cancel_token: CancellationToken,
}

/// Starts and tracks component-add pipelines
pub struct Coordinator {
    store: Arc<dyn RecordStore>,
    deployer: Arc<Deployer>,
    scripts: Arc<dyn ScriptRunner>,
    pipelines: Arc<PipelineStore>,
    running: RwLock<HashMap<ComponentKey, RunningPipeline>>,
    import_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        deployer: Arc<Deployer>,
        scripts: Arc<dyn ScriptRunner>,
        pipelines: Arc<PipelineStore>,
        import_timeout: Duration,
    ) -> Self {
        Self {
            store,
            deployer,
            scripts,
            pipelines,
            running: RwLock::new(HashMap::new()),
            import_timeout,
        }
    }

    /// Start the pipeline that adds a component to an instance
    ///
    /// Returns once the pipeline is registered; stages run on a spawned task.
    pub async fn add_component(
        self: &Arc<Self>,
        instance_id: i64,
        component_uid: &str,
        extra_id: Option<&str>,
        data: Map<String, Value>,
    ) -> Result<PipelineHandle, PipelineError> {
        let key = ComponentKey::new(instance_id, component_uid, extra_id.unwrap_or_default());
        let graph = component_pipeline(data)?;
        let pipeline_id = uuid::Uuid::new_v4().to_string();
        let cancel_token = CancellationToken::new();

        {
            let mut running = self.running.write().await;
            if let Some(existing) = running.get(&key) {
                warn!(key = %key, running = %existing.pipeline_id, "Pipeline already running");
                return Err(PipelineError::AlreadyRunning(key));
            }
            running.insert(
                key.clone(),
                RunningPipeline {
                    pipeline_id: pipeline_id.clone(),
                    cancel_token: cancel_token.clone(),
                },
            );
        }

        self.pipelines
            .create(PipelineRecord::new(pipeline_id.clone(), key.clone()))
            .await;
        info!(pipeline_id = %pipeline_id, key = %key, "Pipeline started");

        let this = Arc::clone(self);
        let task = {
            let id = pipeline_id.clone();
            let key = key.clone();
            let token = cancel_token.clone();
            tokio::spawn(async move {
                // Stages run on their own task so a panic still releases the key
                let run = {
                    let this = Arc::clone(&this);
                    let id = id.clone();
                    let key = key.clone();
                    tokio::spawn(async move { this.execute(&id, &key, graph, &token).await })
                };
                let result = match run.await {
                    Ok(result) => result,
                    Err(e) => Err(this.abort(&id, &key, e).await),
                };
                this.running.write().await.remove(&key);
                result
            })
        };

        Ok(PipelineHandle {
            id: pipeline_id,
            key,
            cancel_token,
            task,
        })
    }

    /// Cancel the running pipeline for a key
    pub async fn cancel(&self, key: &ComponentKey) -> bool {
        match self.running.read().await.get(key) {
            Some(running) => {
                info!(pipeline_id = %running.pipeline_id, key = %key, "Cancelling pipeline");
                running.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel a running pipeline by id
    pub async fn cancel_pipeline(&self, pipeline_id: &str) -> bool {
        let running = self.running.read().await;
        match running.iter().find(|(_, r)| r.pipeline_id == pipeline_id) {
            Some((key, r)) => {
                info!(pipeline_id = %pipeline_id, key = %key, "Cancelling pipeline");
                r.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, key: &ComponentKey) -> bool {
        self.running.read().await.contains_key(key)
    }

    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    async fn execute(
        &self,
        pipeline_id: &str,
        key: &ComponentKey,
        graph: TaskGraph,
        cancel_token: &CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let ctx = StageContext {
            key: key.clone(),
            store: self.store.clone(),
            deployer: self.deployer.clone(),
            scripts: self.scripts.clone(),
            import_timeout: self.import_timeout,
        };
        let observer = RecordingObserver {
            pipelines: self.pipelines.clone(),
            pipeline_id: pipeline_id.to_string(),
        };

        let mut run = GraphExecutor::run(graph, &ctx, cancel_token, &observer).await;
        let prepared = run.state(StageName::Prep) == Some(NodeState::Succeeded);

        if let Some((stage, source)) = run.take_failure() {
            error!(
                pipeline_id = %pipeline_id,
                key = %key,
                stage = %stage,
                error = %source,
                "Pipeline failed"
            );
            if prepared {
                self.mark_failed(key).await;
            }
            self.pipelines
                .finish(
                    pipeline_id,
                    PipelineStatus::Failed,
                    Some(format!("Stage {} failed: {}", stage, source)),
                )
                .await;
            return Err(PipelineError::StageFailure { stage, source });
        }

        if let Some(stage) = run.first_withdrawn() {
            warn!(pipeline_id = %pipeline_id, key = %key, stage = %stage, "Pipeline cancelled");
            if prepared {
                self.mark_failed(key).await;
            }
            self.pipelines
                .finish(
                    pipeline_id,
                    PipelineStatus::Cancelled,
                    Some(format!("Cancelled before stage {}", stage)),
                )
                .await;
            return Err(PipelineError::Cancelled { stage });
        }

        let Some(output) = run.output(StageName::Finalize) else {
            let source = DeployError::MissingInput(StageName::Finalize);
            self.pipelines
                .finish(pipeline_id, PipelineStatus::Failed, Some(source.to_string()))
                .await;
            return Err(PipelineError::StageFailure {
                stage: StageName::Finalize,
                source,
            });
        };

        info!(
            pipeline_id = %pipeline_id,
            key = %key,
            fqdn = output.instance_component.fqdn.as_deref().unwrap_or("-"),
            "Pipeline succeeded"
        );
        self.pipelines
            .finish(pipeline_id, PipelineStatus::Success, None)
            .await;

        Ok(PipelineReport {
            id: pipeline_id.to_string(),
            key: key.clone(),
            instance_component: output.instance_component.clone(),
            deployment: output.deployment.clone(),
        })
    }

    async fn abort(&self, pipeline_id: &str, key: &ComponentKey, e: JoinError) -> PipelineError {
        error!(pipeline_id = %pipeline_id, key = %key, error = %e, "Pipeline task aborted");
        let err = PipelineError::Aborted(e.to_string());
        self.pipelines
            .finish(pipeline_id, PipelineStatus::Failed, Some(err.to_string()))
            .await;
        err
    }

    /// Best effort: the pipeline outcome is already decided
    async fn mark_failed(&self, key: &ComponentKey) {
        let current = match self.store.instance_component(key).await {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load component record");
                return;
            }
        };

        let mut failed = current;
        failed.set_status(ComponentStatus::Failed);
        if let Err(e) = self.store.save_instance_component(failed).await {
            warn!(key = %key, error = %e, "Failed to mark component as failed");
        }
    }
}

/// Mirrors stage transitions into the pipeline store
struct RecordingObserver {
    pipelines: Arc<PipelineStore>,
    pipeline_id: String,
}

#[async_trait]
impl StageObserver for RecordingObserver {
    async fn started(&self, stage: StageName) {
        info!(pipeline_id = %self.pipeline_id, stage = %stage, "Stage started");
        self.pipelines
            .update_stage(&self.pipeline_id, stage, |s| s.start())
            .await;
    }

    async fn finished(&self, stage: StageName, error: Option<&DeployError>) {
        let message = error.map(|e| e.to_string());
        self.pipelines
            .update_stage(&self.pipeline_id, stage, |s| {
                s.finish(message.is_none(), message.clone())
            })
            .await;
    }

    async fn skipped(&self, stage: StageName, blocked_by: StageName) {
        self.pipelines
            .update_stage(&self.pipeline_id, stage, |s| {
                s.skip(Some(format!("{} did not succeed", blocked_by)))
            })
            .await;
    }

    async fn withdrawn(&self, stage: StageName) {
        self.pipelines
            .update_stage(&self.pipeline_id, stage, |s| s.withdraw())
            .await;
    }
}
