//! 运行时状态模块
//!
//! 管理应用状态和流水线记录

pub mod app_state;
pub mod pipeline_store;

pub use app_state::AppState;
pub use pipeline_store::PipelineStore;
