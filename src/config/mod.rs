//! 配置模块
//!
//! 环境变量解析与全局设置

pub mod env;
pub mod settings;

pub use env::EnvConfig;
pub use settings::{FactorySettings, SettingsError};
