//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod component;
pub mod deploy;
pub mod instance;
pub mod pipeline;

// Re-exports for convenience
pub use component::{Component, ComponentKey, ComponentStatus, InstanceComponent, Setting};
pub use deploy::{
    ConnectionEndpoint, DeployTarget, DeploymentSpec, NestedTarget, PhysicalTarget,
    ResolvedParams,
};
pub use instance::{ComputeEndpoint, Endpoint, Instance, InstanceStatus};
pub use pipeline::{PipelineRecord, PipelineStatus, StageName, StageRecord, StageStatus};
