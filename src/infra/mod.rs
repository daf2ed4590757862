//! 基础设施模块
//!
//! 封装外部依赖（记录存储、网络查询、命令执行）

pub mod command;
pub mod network;
pub mod store;

pub use command::{CommandError, CommandOutput, CommandRunner};
pub use network::{MgmtAddress, NetworkAccessor, NetworkRole, StaticNetworkAccessor};
pub use store::{MemoryStore, RecordStore, Snapshot};
