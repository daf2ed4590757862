//! 管理网络地址查询
//!
//! 按实例组件或实例角色查询管理网 IP

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::domain::{ComponentKey, Instance, InstanceComponent};

/// 实例内的网络角色
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NetworkRole {
    /// 默认网关
    #[serde(rename = "gw")]
    Gateway,
    Zbox,
    Vyos,
}

impl NetworkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkRole::Gateway => "gw",
            NetworkRole::Zbox => "zbox",
            NetworkRole::Vyos => "vyos",
        }
    }
}

impl fmt::Display for NetworkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 组件管理网地址
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MgmtAddress {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// 网络地址查询（只读）
pub trait NetworkAccessor: Send + Sync {
    /// 查询实例组件的 IP 与掩码
    fn component_address(&self, instance_component: &InstanceComponent) -> Option<MgmtAddress>;

    /// 查询实例中某个角色的 IP
    fn role_address(&self, instance: &Instance, role: NetworkRole) -> Option<Ipv4Addr>;
}

/// 快照中的组件地址条目
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentAddressEntry {
    #[serde(flatten)]
    pub key: ComponentKey,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// 快照中的角色地址条目
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleAddressEntry {
    pub instance_id: i64,
    pub role: NetworkRole,
    pub ip: Ipv4Addr,
}

/// 快照中的网络段
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    #[serde(default)]
    pub components: Vec<ComponentAddressEntry>,
    #[serde(default)]
    pub roles: Vec<RoleAddressEntry>,
}

/// 基于静态表的地址查询
#[derive(Debug, Default)]
pub struct StaticNetworkAccessor {
    components: HashMap<ComponentKey, MgmtAddress>,
    roles: HashMap<(i64, NetworkRole), Ipv4Addr>,
}

impl StaticNetworkAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &NetworkSnapshot) -> Self {
        let mut accessor = Self::new();
        for entry in &snapshot.components {
            accessor.insert_component(entry.key.clone(), entry.ip, entry.netmask);
        }
        for entry in &snapshot.roles {
            accessor.insert_role(entry.instance_id, entry.role, entry.ip);
        }
        accessor
    }

    pub fn insert_component(&mut self, key: ComponentKey, ip: Ipv4Addr, netmask: Ipv4Addr) {
        self.components.insert(key, MgmtAddress { ip, netmask });
    }

    pub fn insert_role(&mut self, instance_id: i64, role: NetworkRole, ip: Ipv4Addr) {
        self.roles.insert((instance_id, role), ip);
    }
}

impl NetworkAccessor for StaticNetworkAccessor {
    fn component_address(&self, instance_component: &InstanceComponent) -> Option<MgmtAddress> {
        self.components.get(&instance_component.key).copied()
    }

    fn role_address(&self, instance: &Instance, role: NetworkRole) -> Option<Ipv4Addr> {
        self.roles.get(&(instance.id, role)).copied()
    }
}
