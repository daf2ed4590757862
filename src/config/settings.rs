//! 全局工厂设置
//!
//! 从 Setting 记录构建的不可变配置，注入到参数解析器

use thiserror::Error;

use crate::domain::Setting;

pub const SETTING_FACTORY_HOST: &str = "zpodfactory_host";
pub const SETTING_SSH_KEY: &str = "zpodfactory_ssh_key";
pub const SETTING_SITE_ID: &str = "site_id";

/// 设置加载错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// 工厂全局设置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactorySettings {
    /// 工厂主机，同时作为根 DNS 与 NTP
    pub factory_host: String,
    /// 注入到组件的 SSH 公钥
    pub ssh_key: String,
    /// 站点标识
    pub site_id: String,
}

impl FactorySettings {
    /// 从设置记录构建
    ///
    /// `site_id` 设置缺失时使用 `site_id_fallback`
    pub fn from_settings(
        settings: &[Setting],
        site_id_fallback: Option<&str>,
    ) -> Result<Self, SettingsError> {
        let lookup = |name: &str| {
            settings
                .iter()
                .find(|s| s.name == name)
                .map(|s| s.value.clone())
        };

        let factory_host =
            lookup(SETTING_FACTORY_HOST).ok_or(SettingsError::Missing(SETTING_FACTORY_HOST))?;
        let ssh_key = lookup(SETTING_SSH_KEY).ok_or(SettingsError::Missing(SETTING_SSH_KEY))?;
        let site_id = lookup(SETTING_SITE_ID)
            .or_else(|| site_id_fallback.map(str::to_string))
            .ok_or(SettingsError::Missing(SETTING_SITE_ID))?;

        Ok(Self {
            factory_host,
            ssh_key,
            site_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting(name: &str, value: &str) -> Setting {
        Setting {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_from_settings() {
        let settings = vec![
            setting("zpodfactory_host", "10.1.0.1"),
            setting("zpodfactory_ssh_key", "ssh-ed25519 AAAA"),
            setting("site_id", "sfo01"),
        ];
        let fs = FactorySettings::from_settings(&settings, Some("ignored")).unwrap();
        assert_eq!(fs.factory_host, "10.1.0.1");
        assert_eq!(fs.site_id, "sfo01");
    }

    #[test]
    fn test_site_id_fallback() {
        let settings = vec![
            setting("zpodfactory_host", "10.1.0.1"),
            setting("zpodfactory_ssh_key", "key"),
        ];
        let fs = FactorySettings::from_settings(&settings, Some("lab")).unwrap();
        assert_eq!(fs.site_id, "lab");

        assert_eq!(
            FactorySettings::from_settings(&settings, None),
            Err(SettingsError::Missing("site_id"))
        );
    }

    #[test]
    fn test_missing_factory_host() {
        let settings = vec![setting("zpodfactory_ssh_key", "key")];
        assert_eq!(
            FactorySettings::from_settings(&settings, Some("lab")),
            Err(SettingsError::Missing("zpodfactory_host"))
        );
    }
}
