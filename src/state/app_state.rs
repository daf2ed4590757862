//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 全局 shutdown token，用于优雅关闭所有后台任务
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN
        .get_or_init(CancellationToken::new)
        .clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

use crate::config::{EnvConfig, FactorySettings};
use crate::infra::{MemoryStore, RecordStore, Snapshot, StaticNetworkAccessor};
use crate::services::deploy::{Deployer, GovcImporter, TemplateRenderer};
use crate::services::pipeline::Coordinator;
use crate::services::scripts::HookScriptRunner;

use super::pipeline_store::PipelineStore;

/// 应用状态
pub struct AppState {
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
    /// 流水线记录
    pub pipelines: Arc<PipelineStore>,
    /// 流水线调度
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    /// 从快照装配全部依赖
    ///
    /// 工厂设置缺失时直接失败，不会启动任何流水线
    pub async fn build(config: &EnvConfig, snapshot: Snapshot) -> anyhow::Result<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::from_snapshot(&snapshot));
        let network = Arc::new(StaticNetworkAccessor::from_snapshot(&snapshot.network));

        let settings = store.settings().await?;
        let factory = FactorySettings::from_settings(&settings, config.site_id.as_deref())?;
        info!(
            factory_host = %factory.factory_host,
            site_id = %factory.site_id,
            "Factory settings loaded"
        );

        let deployer = Deployer::new(
            network,
            Arc::new(factory),
            TemplateRenderer::new(&config.options_dir),
            Arc::new(GovcImporter::new(&config.import_tool, &config.artifact_root)),
        );
        let scripts = HookScriptRunner::new(config.scripts_dir.clone(), config.script_timeout);
        let pipelines = Arc::new(PipelineStore::new());
        let coordinator = Coordinator::new(
            store,
            Arc::new(deployer),
            Arc::new(scripts),
            pipelines.clone(),
            config.import_timeout,
        );

        Ok(Self {
            started_at: Utc::now(),
            pipelines,
            coordinator: Arc::new(coordinator),
        })
    }
}
