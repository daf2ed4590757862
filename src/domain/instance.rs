//! 实例（zpod）领域模型
//!
//! 由实例管理端创建，本引擎只读

use serde::{Deserialize, Serialize};

/// 实例状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Pending,
    Building,
    Active,
    Deleting,
    Deleted,
    Failed,
}

/// 物理 vSphere 计算端点凭据
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComputeEndpoint {
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub storage_datastore: String,
}

/// 实例所属的物理端点
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub compute: ComputeEndpoint,
}

/// 实例
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    pub id: i64,
    pub name: String,
    pub domain: String,
    /// 实例创建时生成的密码
    pub password: String,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub status: InstanceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_deserialize_defaults_status() {
        let instance: Instance = serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "lab1",
            "domain": "lab1.local",
            "password": "secret",
            "endpoint": {
                "compute": {
                    "hostname": "vc.site",
                    "username": "admin",
                    "password": "pw",
                    "storage_datastore": "ds01"
                }
            }
        }))
        .unwrap();

        assert_eq!(instance.status, InstanceStatus::Pending);
        assert_eq!(instance.endpoint.compute.storage_datastore, "ds01");
    }
}
