//! 记录存储
//!
//! Instance / Component / InstanceComponent / Setting 的读写接口，
//! 以及基于 JSON 快照的内存实现

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::{Component, ComponentKey, Instance, InstanceComponent, Setting};

use super::network::NetworkSnapshot;

/// 记录存储接口
///
/// 本引擎只读 Instance / Component / Setting，只写 InstanceComponent
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn instance(&self, id: i64) -> anyhow::Result<Option<Instance>>;

    async fn component(&self, component_uid: &str) -> anyhow::Result<Option<Component>>;

    async fn settings(&self) -> anyhow::Result<Vec<Setting>>;

    async fn instance_component(
        &self,
        key: &ComponentKey,
    ) -> anyhow::Result<Option<InstanceComponent>>;

    /// 插入或更新实例组件
    async fn save_instance_component(&self, item: InstanceComponent) -> anyhow::Result<()>;
}

/// 记录快照文件格式
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub instance_components: Vec<InstanceComponent>,
    #[serde(default)]
    pub settings: Vec<Setting>,
    #[serde(default)]
    pub network: NetworkSnapshot,
}

impl Snapshot {
    /// 从文件加载快照
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

        info!(
            path = %path.display(),
            instances = snapshot.instances.len(),
            components = snapshot.components.len(),
            settings = snapshot.settings.len(),
            "Loaded record snapshot"
        );
        Ok(snapshot)
    }
}

/// 内存记录存储
#[derive(Default)]
pub struct MemoryStore {
    instances: RwLock<HashMap<i64, Instance>>,
    components: RwLock<HashMap<String, Component>>,
    instance_components: RwLock<HashMap<ComponentKey, InstanceComponent>>,
    settings: RwLock<Vec<Setting>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从快照构建
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let instances = snapshot
            .instances
            .iter()
            .map(|i| (i.id, i.clone()))
            .collect();
        let components = snapshot
            .components
            .iter()
            .map(|c| (c.component_uid.clone(), c.clone()))
            .collect();
        let instance_components = snapshot
            .instance_components
            .iter()
            .map(|ic| (ic.key.clone(), ic.clone()))
            .collect();

        Self {
            instances: RwLock::new(instances),
            components: RwLock::new(components),
            instance_components: RwLock::new(instance_components),
            settings: RwLock::new(snapshot.settings.clone()),
        }
    }

    pub async fn insert_instance(&self, instance: Instance) {
        self.instances.write().await.insert(instance.id, instance);
    }

    pub async fn insert_component(&self, component: Component) {
        self.components
            .write()
            .await
            .insert(component.component_uid.clone(), component);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn instance(&self, id: i64) -> anyhow::Result<Option<Instance>> {
        Ok(self.instances.read().await.get(&id).cloned())
    }

    async fn component(&self, component_uid: &str) -> anyhow::Result<Option<Component>> {
        Ok(self.components.read().await.get(component_uid).cloned())
    }

    async fn settings(&self) -> anyhow::Result<Vec<Setting>> {
        Ok(self.settings.read().await.clone())
    }

    async fn instance_component(
        &self,
        key: &ComponentKey,
    ) -> anyhow::Result<Option<InstanceComponent>> {
        Ok(self.instance_components.read().await.get(key).cloned())
    }

    async fn save_instance_component(&self, item: InstanceComponent) -> anyhow::Result<()> {
        self.instance_components
            .write()
            .await
            .insert(item.key.clone(), item);
        Ok(())
    }
}
