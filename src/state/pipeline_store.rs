//! 流水线存储
//!
//! 管理运行中的流水线和历史记录，自动清理过期记录

use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::config::env::constants::{MAX_PIPELINE_HISTORY, PIPELINE_RETENTION_HOURS};
use crate::domain::{PipelineRecord, PipelineStatus, StageName, StageRecord};

/// 流水线存储
pub struct PipelineStore {
    /// 运行中的流水线
    active: RwLock<HashMap<String, PipelineRecord>>,
    /// 历史记录（最新在前）
    history: RwLock<VecDeque<PipelineRecord>>,
    max_history: usize,
    retention: Duration,
}

impl Default for PipelineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStore {
    pub fn new() -> Self {
        Self::with_config(MAX_PIPELINE_HISTORY, PIPELINE_RETENTION_HOURS)
    }

    /// 使用自定义配置创建
    pub fn with_config(max_history: usize, retention_hours: i64) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
            retention: Duration::hours(retention_hours),
        }
    }

    /// 登记新流水线
    pub async fn create(&self, record: PipelineRecord) -> String {
        let id = record.id.clone();
        self.active.write().await.insert(id.clone(), record);
        id
    }

    /// 获取运行中的流水线
    pub async fn get(&self, id: &str) -> Option<PipelineRecord> {
        self.active.read().await.get(id).cloned()
    }

    /// 获取流水线（先查运行中，再查历史）
    pub async fn get_any(&self, id: &str) -> Option<PipelineRecord> {
        if let Some(record) = self.get(id).await {
            return Some(record);
        }
        let history = self.history.read().await;
        history.iter().find(|r| r.id == id).cloned()
    }

    /// 所有运行中的流水线
    pub async fn get_all(&self) -> Vec<PipelineRecord> {
        self.active.read().await.values().cloned().collect()
    }

    /// 修改某个阶段的记录
    pub async fn update_stage<F>(&self, id: &str, stage: StageName, f: F)
    where
        F: FnOnce(&mut StageRecord),
    {
        let mut active = self.active.write().await;
        if let Some(stage) = active.get_mut(id).and_then(|r| r.stage_mut(stage)) {
            f(stage);
        }
    }

    /// 结束流水线并移入历史记录
    pub async fn finish(&self, id: &str, status: PipelineStatus, error: Option<String>) {
        let record = {
            let mut active = self.active.write().await;
            active.remove(id).map(|mut record| {
                record.complete(status, error);
                record
            })
        };

        if let Some(record) = record {
            self.add_to_history(record).await;
        }
    }

    async fn add_to_history(&self, record: PipelineRecord) {
        let mut history = self.history.write().await;
        history.push_front(record);

        while history.len() > self.max_history {
            history.pop_back();
        }
    }

    /// 获取历史记录，可按状态过滤
    pub async fn get_history(&self, limit: usize, status: Option<&str>) -> Vec<PipelineRecord> {
        let history = self.history.read().await;
        history
            .iter()
            .filter(|r| status.map_or(true, |s| r.status.as_str() == s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn history_count(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// 清理超过保留时间的历史记录
    pub async fn cleanup_stale(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let mut history = self.history.write().await;
        let before = history.len();
        history.retain(|r| r.finished_at.map_or(true, |t| t > cutoff));
        before - history.len()
    }
}
