//! 部署服务模块
//!
//! Deploy 阶段内部流程：参数解析 → 模板渲染 → 导入

pub mod error;
pub mod invoker;
pub mod renderer;
pub mod resolver;

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FactorySettings;
use crate::domain::{Component, DeploymentSpec, Instance, InstanceComponent};
use crate::infra::NetworkAccessor;

pub use error::{
    DeployError, ImportError, NetworkResolutionError, ScriptError, TemplateError,
};
pub use invoker::{GovcImporter, HypervisorImporter, ImportCommand, ImportOutcome};
pub use renderer::TemplateRenderer;
pub use resolver::DeploymentResolver;

/// 部署执行器
///
/// 持有解析、渲染、导入所需的只读依赖，可在多个流水线间共享
pub struct Deployer {
    network: Arc<dyn NetworkAccessor>,
    settings: Arc<FactorySettings>,
    renderer: TemplateRenderer,
    importer: Arc<dyn HypervisorImporter>,
}

impl Deployer {
    pub fn new(
        network: Arc<dyn NetworkAccessor>,
        settings: Arc<FactorySettings>,
        renderer: TemplateRenderer,
        importer: Arc<dyn HypervisorImporter>,
    ) -> Self {
        Self {
            network,
            settings,
            renderer,
            importer,
        }
    }

    /// 执行部署
    ///
    /// 任一步失败即返回，不会进入后续步骤；导入超时后子进程被终止
    pub async fn deploy(
        &self,
        instance_component: &InstanceComponent,
        instance: &Instance,
        component: &Component,
        import_timeout: Duration,
    ) -> Result<DeploymentSpec, DeployError> {
        let resolver = DeploymentResolver::new(self.network.as_ref(), &self.settings);
        let params = resolver.resolve(instance_component, instance, component)?;

        let options_path = self
            .renderer
            .render(&component.deploy_spec_template, &params)
            .await?;

        let vm_name = params.vm_name();
        info!(
            key = %instance_component.key,
            vm_name = %vm_name,
            nested = params.target.is_nested(),
            "Deploying component"
        );

        let import = self.importer.import(&params, component, &options_path);
        match tokio::time::timeout(import_timeout, import).await {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                warn!(vm_name = %vm_name, "Import timed out after {:?}", import_timeout);
                return Err(ImportError::Timeout(import_timeout).into());
            }
        }

        Ok(DeploymentSpec {
            params,
            vm_name,
            options_path,
        })
    }
}
