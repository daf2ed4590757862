//! 组件相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::net::Ipv4Addr;

/// 组件目录条目（只读）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Component {
    /// 目录唯一标识 (e.g., "esxi-8.0u2")
    pub component_uid: String,
    /// 组件名称 (e.g., "esxi", "zbox")
    pub name: String,
    pub version: String,
    /// OVA 文件名
    pub filename: String,
    /// 是否部署在实例内部的嵌套 vSphere 上
    #[serde(default, alias = "isNested")]
    pub is_nested: bool,
    /// govc 部署参数模板
    #[serde(default, alias = "deploySpecTemplate")]
    pub deploy_spec_template: Value,
}

/// 全局设置项
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

/// 组件添加操作的关联键
///
/// 同一个键关联一次添加操作的所有阶段
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ComponentKey {
    pub instance_id: i64,
    pub component_uid: String,
    #[serde(default)]
    pub extra_id: String,
}

impl ComponentKey {
    pub fn new(
        instance_id: i64,
        component_uid: impl Into<String>,
        extra_id: impl Into<String>,
    ) -> Self {
        Self {
            instance_id,
            component_uid: component_uid.into(),
            extra_id: extra_id.into(),
        }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.instance_id, self.component_uid, self.extra_id
        )
    }
}

/// 实例组件状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Building,
    Active,
    Failed,
}

/// 实例中的一个组件部署
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceComponent {
    #[serde(flatten)]
    pub key: ComponentKey,
    /// 覆盖参数 (hostname, last_octet, ...)
    #[serde(default)]
    pub data: Map<String, Value>,
    pub status: ComponentStatus,
    pub hostname: Option<String>,
    pub fqdn: Option<String>,
    pub ip: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceComponent {
    /// 创建构建中的实例组件
    pub fn new(key: ComponentKey, data: Map<String, Value>) -> Self {
        Self {
            key,
            data,
            status: ComponentStatus::Building,
            hostname: None,
            fqdn: None,
            ip: None,
            netmask: None,
            updated_at: Utc::now(),
        }
    }

    /// 读取覆盖参数，数字和字符串都按文本处理
    pub fn data_str(&self, name: &str) -> Option<String> {
        match self.data.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// 更新状态
    pub fn set_status(&mut self, status: ComponentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
