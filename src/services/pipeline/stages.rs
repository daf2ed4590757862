//! The five stages of adding a component
//!
//! Prep → PreScripts → Deploy → PostScripts → Finalize

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::domain::{
    Component, ComponentKey, ComponentStatus, DeploymentSpec, Instance, InstanceComponent,
    StageName,
};
use crate::infra::RecordStore;
use crate::services::deploy::{DeployError, Deployer};
use crate::services::scripts::{ScriptPhase, ScriptRunner};

use super::graph::{BoxedStage, GraphError, Stage, TaskGraph};

/// Shared dependencies for one pipeline run
pub struct StageContext {
    pub key: ComponentKey,
    pub store: Arc<dyn RecordStore>,
    pub deployer: Arc<Deployer>,
    pub scripts: Arc<dyn ScriptRunner>,
    pub import_timeout: Duration,
}

/// State handed from a stage to its successors
#[derive(Clone, Debug)]
pub struct StageOutput {
    pub instance: Arc<Instance>,
    pub component: Arc<Component>,
    pub instance_component: InstanceComponent,
    pub deployment: Option<DeploymentSpec>,
}

/// Standard linear pipeline for adding a component
pub fn component_pipeline(data: Map<String, Value>) -> Result<TaskGraph, GraphError> {
    let stages: Vec<BoxedStage> = vec![
        Box::new(PrepStage { data }),
        Box::new(ScriptStage::new(ScriptPhase::Pre)),
        Box::new(DeployStage),
        Box::new(ScriptStage::new(ScriptPhase::Post)),
        Box::new(FinalizeStage),
    ];
    TaskGraph::chain(stages)
}

fn single_input(stage: StageName, inputs: &[StageOutput]) -> Result<&StageOutput, DeployError> {
    inputs.first().ok_or(DeployError::MissingInput(stage))
}

/// Loads the records and creates the InstanceComponent in `Building`
pub struct PrepStage {
    data: Map<String, Value>,
}

impl PrepStage {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Stage for PrepStage {
    fn name(&self) -> StageName {
        StageName::Prep
    }

    async fn run(
        &self,
        ctx: &StageContext,
        _inputs: &[StageOutput],
    ) -> Result<StageOutput, DeployError> {
        let key = &ctx.key;
        let instance = ctx
            .store
            .instance(key.instance_id)
            .await?
            .ok_or_else(|| DeployError::RecordNotFound(format!("instance {}", key.instance_id)))?;
        let component = ctx
            .store
            .component(&key.component_uid)
            .await?
            .ok_or_else(|| {
                DeployError::RecordNotFound(format!("component {}", key.component_uid))
            })?;

        // Building or Failed records are reused, an Active one is not
        if let Some(existing) = ctx.store.instance_component(key).await? {
            if existing.status == ComponentStatus::Active {
                return Err(DeployError::AlreadyDeployed(key.clone()));
            }
        }

        let instance_component = InstanceComponent::new(key.clone(), self.data.clone());
        ctx.store
            .save_instance_component(instance_component.clone())
            .await?;

        info!(
            key = %key,
            instance = %instance.name,
            component = %component.name,
            "Component record prepared"
        );

        Ok(StageOutput {
            instance: Arc::new(instance),
            component: Arc::new(component),
            instance_component,
            deployment: None,
        })
    }
}

/// Runs the pre or post script hook
pub struct ScriptStage {
    phase: ScriptPhase,
}

impl ScriptStage {
    pub fn new(phase: ScriptPhase) -> Self {
        Self { phase }
    }
}

#[async_trait]
impl Stage for ScriptStage {
    fn name(&self) -> StageName {
        match self.phase {
            ScriptPhase::Pre => StageName::PreScripts,
            ScriptPhase::Post => StageName::PostScripts,
        }
    }

    async fn run(
        &self,
        ctx: &StageContext,
        inputs: &[StageOutput],
    ) -> Result<StageOutput, DeployError> {
        let input = single_input(self.name(), inputs)?;
        ctx.scripts
            .run(self.phase, &input.instance_component, &input.component)
            .await?;
        Ok(input.clone())
    }
}

/// Resolves, renders and imports, then records the addressing
pub struct DeployStage;

#[async_trait]
impl Stage for DeployStage {
    fn name(&self) -> StageName {
        StageName::Deploy
    }

    async fn run(
        &self,
        ctx: &StageContext,
        inputs: &[StageOutput],
    ) -> Result<StageOutput, DeployError> {
        let input = single_input(self.name(), inputs)?;
        let spec = ctx
            .deployer
            .deploy(
                &input.instance_component,
                &input.instance,
                &input.component,
                ctx.import_timeout,
            )
            .await?;

        let mut instance_component = input.instance_component.clone();
        instance_component.hostname = Some(spec.params.hostname.clone());
        instance_component.fqdn = Some(spec.vm_name.clone());
        instance_component.ip = Some(spec.params.ip);
        instance_component.netmask = Some(spec.params.netmask);
        instance_component.updated_at = Utc::now();
        ctx.store
            .save_instance_component(instance_component.clone())
            .await?;

        Ok(StageOutput {
            instance: input.instance.clone(),
            component: input.component.clone(),
            instance_component,
            deployment: Some(spec),
        })
    }
}

/// Marks the InstanceComponent `Active`
pub struct FinalizeStage;

#[async_trait]
impl Stage for FinalizeStage {
    fn name(&self) -> StageName {
        StageName::Finalize
    }

    async fn run(
        &self,
        ctx: &StageContext,
        inputs: &[StageOutput],
    ) -> Result<StageOutput, DeployError> {
        let mut output = single_input(self.name(), inputs)?.clone();
        output
            .instance_component
            .set_status(ComponentStatus::Active);
        ctx.store
            .save_instance_component(output.instance_component.clone())
            .await?;

        info!(
            key = %ctx.key,
            fqdn = output.instance_component.fqdn.as_deref().unwrap_or("-"),
            "Component active"
        );
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infra::{MemoryStore, StaticNetworkAccessor};
    use crate::services::deploy::resolver::tests::{component, instance, settings};
    use crate::services::deploy::tests::StubImporter;
    use crate::services::deploy::{ScriptError, TemplateRenderer};
    use std::sync::Mutex;

    /// Script runner double that records phases and can fail one
    #[derive(Default)]
    pub(crate) struct RecordingScripts {
        pub phases: Mutex<Vec<ScriptPhase>>,
        pub fail_on: Option<ScriptPhase>,
    }

    impl RecordingScripts {
        pub(crate) fn failing(phase: ScriptPhase) -> Self {
            Self {
                fail_on: Some(phase),
                ..Self::default()
            }
        }

        pub(crate) fn ran(&self) -> Vec<ScriptPhase> {
            self.phases.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScriptRunner for RecordingScripts {
        async fn run(
            &self,
            phase: ScriptPhase,
            _instance_component: &InstanceComponent,
            _component: &Component,
        ) -> Result<(), ScriptError> {
            self.phases.lock().unwrap().push(phase);
            if self.fail_on == Some(phase) {
                return Err(ScriptError::Failed {
                    phase: phase.as_str(),
                    exit_code: Some(1),
                    stderr: "hook failed".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Context over an empty store, for scheduler tests that never touch it
    pub(crate) async fn context() -> StageContext {
        let deployer = Deployer::new(
            Arc::new(StaticNetworkAccessor::new()),
            Arc::new(settings()),
            TemplateRenderer::new(std::env::temp_dir()),
            Arc::new(StubImporter::ok()),
        );
        StageContext {
            key: ComponentKey::new(1, "esxi-1.0", ""),
            store: Arc::new(MemoryStore::new()),
            deployer: Arc::new(deployer),
            scripts: Arc::new(RecordingScripts::default()),
            import_timeout: Duration::from_secs(5),
        }
    }

    pub(crate) fn output() -> StageOutput {
        let c = component("esxi", false);
        StageOutput {
            instance: Arc::new(instance()),
            instance_component: InstanceComponent::new(
                ComponentKey::new(1, c.component_uid.clone(), ""),
                Map::new(),
            ),
            component: Arc::new(c),
            deployment: None,
        }
    }

    async fn seeded_context() -> (StageContext, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_instance(instance()).await;
        store.insert_component(component("esxi", false)).await;
        let mut ctx = context().await;
        ctx.store = store.clone();
        (ctx, store)
    }

    #[tokio::test]
    async fn test_prep_creates_building_record() {
        let (ctx, store) = seeded_context().await;
        let mut data = Map::new();
        data.insert("last_octet".to_string(), Value::from(12));

        let output = PrepStage::new(data).run(&ctx, &[]).await.unwrap();

        assert_eq!(output.instance.name, "lab1");
        assert_eq!(output.component.name, "esxi");
        let saved = store.instance_component(&ctx.key).await.unwrap().unwrap();
        assert_eq!(saved.status, ComponentStatus::Building);
        assert_eq!(saved.data_str("last_octet").as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn test_prep_missing_instance() {
        let ctx = context().await;
        let err = PrepStage::new(Map::new()).run(&ctx, &[]).await.unwrap_err();
        assert!(matches!(err, DeployError::RecordNotFound(ref what) if what == "instance 1"));
    }

    #[tokio::test]
    async fn test_prep_rejects_active_component() {
        let (ctx, store) = seeded_context().await;
        let mut existing = InstanceComponent::new(ctx.key.clone(), Map::new());
        existing.set_status(ComponentStatus::Active);
        store.save_instance_component(existing).await.unwrap();

        let err = PrepStage::new(Map::new()).run(&ctx, &[]).await.unwrap_err();
        assert!(matches!(err, DeployError::AlreadyDeployed(_)));
    }

    #[tokio::test]
    async fn test_prep_reuses_failed_component() {
        let (ctx, store) = seeded_context().await;
        let mut existing = InstanceComponent::new(ctx.key.clone(), Map::new());
        existing.set_status(ComponentStatus::Failed);
        store.save_instance_component(existing).await.unwrap();

        PrepStage::new(Map::new()).run(&ctx, &[]).await.unwrap();
        let saved = store.instance_component(&ctx.key).await.unwrap().unwrap();
        assert_eq!(saved.status, ComponentStatus::Building);
    }

    #[tokio::test]
    async fn test_stage_without_input_is_error() {
        let ctx = context().await;
        let err = FinalizeStage.run(&ctx, &[]).await.unwrap_err();
        assert!(matches!(err, DeployError::MissingInput(StageName::Finalize)));
    }

    #[tokio::test]
    async fn test_finalize_marks_active() {
        let (ctx, store) = seeded_context().await;
        let output = FinalizeStage.run(&ctx, &[output()]).await.unwrap();

        assert_eq!(output.instance_component.status, ComponentStatus::Active);
        let saved = store.instance_component(&ctx.key).await.unwrap().unwrap();
        assert_eq!(saved.status, ComponentStatus::Active);
    }

    #[test]
    fn test_component_pipeline_is_linear() {
        let graph = component_pipeline(Map::new()).unwrap();
        assert_eq!(graph.stage_names(), StageName::ALL.to_vec());
        assert_eq!(
            graph.predecessors(StageName::PostScripts),
            Some(&[StageName::Deploy][..])
        );
    }
}
