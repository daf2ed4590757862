//! Deployment parameter resolution
//!
//! Computes every parameter needed to deploy one instance component,
//! branching on the component's topology.

use std::net::Ipv4Addr;
use tracing::debug;

use crate::config::FactorySettings;
use crate::domain::{
    Component, ConnectionEndpoint, DeployTarget, Instance, InstanceComponent, NestedTarget,
    PhysicalTarget, ResolvedParams,
};
use crate::infra::{NetworkAccessor, NetworkRole};

use super::error::NetworkResolutionError;

/// Components that serve DNS for their instance and resolve against the factory host
const DNS_AUTHORITY_COMPONENTS: [&str; 2] = ["zbox", "vyos"];

/// Resolves deployment parameters from records, settings and network lookups
pub struct DeploymentResolver<'a> {
    network: &'a dyn NetworkAccessor,
    settings: &'a FactorySettings,
}

impl<'a> DeploymentResolver<'a> {
    pub fn new(network: &'a dyn NetworkAccessor, settings: &'a FactorySettings) -> Self {
        Self { network, settings }
    }

    pub fn resolve(
        &self,
        instance_component: &InstanceComponent,
        instance: &Instance,
        component: &Component,
    ) -> Result<ResolvedParams, NetworkResolutionError> {
        let hostname = resolve_hostname(instance_component, component);

        let address = self
            .network
            .component_address(instance_component)
            .ok_or_else(|| NetworkResolutionError {
                role: "component".to_string(),
                subject: instance_component.key.to_string(),
            })?;

        let gateway = self.role_address(instance, NetworkRole::Gateway)?;
        let dns = self.resolve_dns(instance, component)?;
        let target = self.resolve_target(instance, component);

        debug!(
            key = %instance_component.key,
            hostname = %hostname,
            ip = %address.ip,
            nested = target.is_nested(),
            "Resolved deployment parameters"
        );

        Ok(ResolvedParams {
            hostname,
            ip: address.ip,
            netmask: address.netmask,
            gateway,
            dns,
            ntp: self.settings.factory_host.clone(),
            domain: instance.domain.clone(),
            password: instance.password.clone(),
            ssh_key: self.settings.ssh_key.clone(),
            target,
        })
    }

    fn role_address(
        &self,
        instance: &Instance,
        role: NetworkRole,
    ) -> Result<Ipv4Addr, NetworkResolutionError> {
        self.network
            .role_address(instance, role)
            .ok_or_else(|| NetworkResolutionError {
                role: role.to_string(),
                subject: instance.name.clone(),
            })
    }

    /// The factory host is root DNS for an instance's zbox/vyos appliances;
    /// those appliances serve every other component of the instance.
    fn resolve_dns(
        &self,
        instance: &Instance,
        component: &Component,
    ) -> Result<String, NetworkResolutionError> {
        if DNS_AUTHORITY_COMPONENTS.contains(&component.name.as_str()) {
            return Ok(self.settings.factory_host.clone());
        }

        self.network
            .role_address(instance, NetworkRole::Zbox)
            .or_else(|| self.network.role_address(instance, NetworkRole::Vyos))
            .map(|ip| ip.to_string())
            .ok_or_else(|| NetworkResolutionError {
                role: "zbox/vyos".to_string(),
                subject: instance.name.clone(),
            })
    }

    fn resolve_target(&self, instance: &Instance, component: &Component) -> DeployTarget {
        if component.is_nested {
            DeployTarget::Nested(NestedTarget {
                connection: ConnectionEndpoint {
                    hostname: format!("vcsa.{}", instance.domain),
                    username: format!("administrator@{}", instance.domain),
                    password: instance.password.clone(),
                },
            })
        } else {
            let compute = &instance.endpoint.compute;
            let site_id = &self.settings.site_id;
            DeployTarget::Physical(PhysicalTarget {
                connection: ConnectionEndpoint {
                    hostname: compute.hostname.clone(),
                    username: compute.username.clone(),
                    password: compute.password.clone(),
                },
                datastore: compute.storage_datastore.clone(),
                resource_pool: format!("{}-{}", site_id, instance.name),
                network_segment: format!("{}-{}-segment", site_id, instance.name),
            })
        }
    }
}

/// Hostname precedence: explicit `hostname`, then `{name}{last_octet}`, then `{name}`
pub fn resolve_hostname(instance_component: &InstanceComponent, component: &Component) -> String {
    if let Some(hostname) = instance_component.data_str("hostname") {
        return hostname;
    }
    if let Some(last_octet) = instance_component.data_str("last_octet") {
        return format!("{}{}", component.name, last_octet);
    }
    component.name.clone()
}
