//! 流水线相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::component::ComponentKey;

/// 组件添加流水线的阶段
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Prep,
    PreScripts,
    Deploy,
    PostScripts,
    Finalize,
}

impl StageName {
    /// 按执行顺序排列的全部阶段
    pub const ALL: [StageName; 5] = [
        StageName::Prep,
        StageName::PreScripts,
        StageName::Deploy,
        StageName::PostScripts,
        StageName::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Prep => "prep",
            StageName::PreScripts => "pre_scripts",
            StageName::Deploy => "deploy",
            StageName::PostScripts => "post_scripts",
            StageName::Finalize => "finalize",
        }
    }

    /// 显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            StageName::Prep => "Prep",
            StageName::PreScripts => "Pre Scripts",
            StageName::Deploy => "Deploy",
            StageName::PostScripts => "Post Scripts",
            StageName::Finalize => "Finalize",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 流水线状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Running => "running",
            PipelineStatus::Success => "success",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Cancelled => "cancelled",
        }
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// 上游失败，未启动
    Skipped,
    /// 启动前被取消
    Withdrawn,
}

/// 阶段执行记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: StageName,
    pub display_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    /// 附加信息（失败原因等）
    pub message: Option<String>,
}

impl StageRecord {
    /// 创建新的待执行阶段
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            display_name: name.display_name().to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }

    /// 撤回阶段
    pub fn withdraw(&mut self) {
        self.status = StageStatus::Withdrawn;
        self.message = Some("cancelled before start".to_string());
    }
}

/// 一次组件添加操作的记录
#[derive(Clone, Debug, Serialize)]
pub struct PipelineRecord {
    pub id: String,
    pub key: ComponentKey,
    pub status: PipelineStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
    /// 失败诊断信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineRecord {
    /// 创建新记录，所有阶段处于待执行状态
    pub fn new(id: String, key: ComponentKey) -> Self {
        Self {
            id,
            key,
            status: PipelineStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            stages: StageName::ALL.iter().copied().map(StageRecord::new).collect(),
            error: None,
        }
    }

    /// 获取阶段记录
    pub fn stage_mut(&mut self, name: StageName) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// 设置终态
    pub fn complete(&mut self, status: PipelineStatus, error: Option<String>) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_record_lifecycle() {
        let mut stage = StageRecord::new(StageName::Deploy);
        assert_eq!(stage.status, StageStatus::Pending);
        assert_eq!(stage.display_name, "Deploy");

        stage.start();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.started_at.is_some());

        stage.finish(false, Some("govc exited with 1".to_string()));
        assert_eq!(stage.status, StageStatus::Failed);
        assert!(stage.finished_at.is_some());
        assert!(stage.duration_ms.is_some());
    }

    #[test]
    fn test_new_record_lists_every_stage_in_order() {
        let record = PipelineRecord::new("p1".to_string(), ComponentKey::new(1, "esxi", ""));
        let names: Vec<_> = record.stages.iter().map(|s| s.name).collect();
        assert_eq!(names, StageName::ALL.to_vec());
        assert_eq!(record.status, PipelineStatus::Running);
    }
}
