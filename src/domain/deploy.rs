//! 部署参数领域模型
//!
//! 解析后的部署参数与目标拓扑

use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// 嵌套部署的资源池
pub const NESTED_RESOURCE_POOL: &str = "Cluster";
/// 嵌套部署的数据存储
pub const NESTED_DATASTORE: &str = "NFS-01";
/// 嵌套部署的端口组
pub const NESTED_NETWORK_SEGMENT: &str = "VM Network";

/// vCenter 连接端点
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    pub hostname: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl ConnectionEndpoint {
    /// govc 连接 URL
    pub fn url(&self) -> String {
        format!(
            "https://{}:{}@{}/sdk",
            self.username, self.password, self.hostname
        )
    }

    /// 日志用 URL（隐藏密码）
    pub fn masked_url(&self) -> String {
        format!("https://{}:XXXXXXXX@{}/sdk", self.username, self.hostname)
    }
}

/// 部署到物理 vSphere 端点
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PhysicalTarget {
    pub connection: ConnectionEndpoint,
    pub datastore: String,
    /// "{site_id}-{instance}"
    pub resource_pool: String,
    /// "{site_id}-{instance}-segment"
    pub network_segment: String,
}

/// 部署到实例内部的嵌套 vCenter
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct NestedTarget {
    pub connection: ConnectionEndpoint,
}

/// 部署目标拓扑
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "topology", rename_all = "snake_case")]
pub enum DeployTarget {
    Physical(PhysicalTarget),
    Nested(NestedTarget),
}

impl DeployTarget {
    pub fn connection(&self) -> &ConnectionEndpoint {
        match self {
            DeployTarget::Physical(t) => &t.connection,
            DeployTarget::Nested(t) => &t.connection,
        }
    }

    pub fn resource_pool(&self) -> &str {
        match self {
            DeployTarget::Physical(t) => &t.resource_pool,
            DeployTarget::Nested(_) => NESTED_RESOURCE_POOL,
        }
    }

    pub fn datastore(&self) -> &str {
        match self {
            DeployTarget::Physical(t) => &t.datastore,
            DeployTarget::Nested(_) => NESTED_DATASTORE,
        }
    }

    pub fn network_segment(&self) -> &str {
        match self {
            DeployTarget::Physical(t) => &t.network_segment,
            DeployTarget::Nested(_) => NESTED_NETWORK_SEGMENT,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, DeployTarget::Nested(_))
    }
}

/// 解析完成的部署参数
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedParams {
    pub hostname: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: String,
    pub ntp: String,
    pub domain: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub ssh_key: String,
    pub target: DeployTarget,
}

impl ResolvedParams {
    /// 虚拟机全名 "{hostname}.{domain}"
    pub fn vm_name(&self) -> String {
        format!("{}.{}", self.hostname, self.domain)
    }

    /// 掩码前缀长度
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.netmask).count_ones()
    }

    pub fn network_segment(&self) -> &str {
        self.target.network_segment()
    }
}

/// 一次 Deploy 阶段的产物
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentSpec {
    pub params: ResolvedParams,
    pub vm_name: String,
    pub options_path: PathBuf,
}
