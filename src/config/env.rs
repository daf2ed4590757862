//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use constants::{
    DEFAULT_ARTIFACT_ROOT, DEFAULT_IMPORT_TIMEOUT_SECS, DEFAULT_IMPORT_TOOL, DEFAULT_OPTIONS_DIR,
    DEFAULT_PORT, DEFAULT_SCRIPT_TIMEOUT_SECS, DEFAULT_SNAPSHOT_PATH,
};

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听端口
    pub port: u16,
    /// 记录快照文件（实例、组件、设置、网络）
    pub snapshot_path: PathBuf,
    /// OVA 制品根目录
    pub artifact_root: PathBuf,
    /// 渲染后的 options 文件目录
    pub options_dir: PathBuf,
    /// 导入工具可执行文件
    pub import_tool: String,
    /// 单次导入的最长等待时间
    pub import_timeout: Duration,
    /// 部署前后脚本目录（可选）
    pub scripts_dir: Option<PathBuf>,
    /// 单个脚本的最长等待时间
    pub script_timeout: Duration,
    /// 站点标识（设置中缺失时使用）
    pub site_id: Option<String>,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let port = parse_or("ZPOD_ENGINE_PORT", DEFAULT_PORT);

        let snapshot_path = env::var("ZPOD_SNAPSHOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SNAPSHOT_PATH));

        let artifact_root = env::var("ZPOD_ARTIFACT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ARTIFACT_ROOT));

        let options_dir = env::var("ZPOD_OPTIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_OPTIONS_DIR));

        let import_tool =
            env::var("ZPOD_IMPORT_TOOL").unwrap_or_else(|_| DEFAULT_IMPORT_TOOL.to_string());

        let import_timeout = Duration::from_secs(parse_or(
            "ZPOD_IMPORT_TIMEOUT_SECS",
            DEFAULT_IMPORT_TIMEOUT_SECS,
        ));

        let scripts_dir = env::var("ZPOD_SCRIPTS_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let script_timeout = Duration::from_secs(parse_or(
            "ZPOD_SCRIPT_TIMEOUT_SECS",
            DEFAULT_SCRIPT_TIMEOUT_SECS,
        ));

        let site_id = env::var("ZPOD_SITE_ID").ok().filter(|s| !s.is_empty());

        Self {
            port,
            snapshot_path,
            artifact_root,
            options_dir,
            import_tool,
            import_timeout,
            scripts_dir,
            script_timeout,
            site_id,
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            artifact_root: PathBuf::from(DEFAULT_ARTIFACT_ROOT),
            options_dir: PathBuf::from(DEFAULT_OPTIONS_DIR),
            import_tool: DEFAULT_IMPORT_TOOL.to_string(),
            import_timeout: Duration::from_secs(DEFAULT_IMPORT_TIMEOUT_SECS),
            scripts_dir: None,
            script_timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
            site_id: None,
        }
    }
}

/// 解析环境变量，失败时使用默认值
fn parse_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(var = name, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// 常量
pub mod constants {
    /// 默认监听端口
    pub const DEFAULT_PORT: u16 = 8100;

    /// 默认快照路径
    pub const DEFAULT_SNAPSHOT_PATH: &str = "/etc/zpod-engine/snapshot.json";

    /// 默认 OVA 制品目录
    pub const DEFAULT_ARTIFACT_ROOT: &str = "/products";

    /// 默认 options 输出目录
    pub const DEFAULT_OPTIONS_DIR: &str = "/tmp";

    /// 默认导入工具
    pub const DEFAULT_IMPORT_TOOL: &str = "govc";

    /// 导入超时（秒）
    pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 3600; // 60 分钟

    /// 脚本超时（秒）
    pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 600;

    /// 流水线历史最大保存数量
    pub const MAX_PIPELINE_HISTORY: usize = 200;

    /// 流水线记录保留时间（小时）
    pub const PIPELINE_RETENTION_HOURS: i64 = 24;

    /// 流水线记录清理周期（秒）
    pub const CLEANUP_INTERVAL_SECS: u64 = 3600;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
