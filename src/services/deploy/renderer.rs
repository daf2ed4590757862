//! Options template rendering
//!
//! Substitutes resolved parameters into a component's govc options template.
//! Placeholders use the `{{ name }}` form and are replaced in the template's
//! serialized JSON text; the result must parse back as JSON.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::domain::ResolvedParams;

use super::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Renders options documents into a directory
#[derive(Clone, Debug)]
pub struct TemplateRenderer {
    options_dir: PathBuf,
}

impl TemplateRenderer {
    pub fn new(options_dir: impl Into<PathBuf>) -> Self {
        Self {
            options_dir: options_dir.into(),
        }
    }

    /// Path of the options document for a VM
    ///
    /// The name must stay a single path component under the options directory.
    pub fn options_path(&self, vm_name: &str) -> Result<PathBuf, TemplateError> {
        validate_vm_name(vm_name)?;
        Ok(self.options_dir.join(format!("{}.json", vm_name)))
    }

    /// Render the template and write it to `{options_dir}/{hostname}.{domain}.json`
    pub async fn render(
        &self,
        template: &Value,
        params: &ResolvedParams,
    ) -> Result<PathBuf, TemplateError> {
        let path = self.options_path(&params.vm_name())?;
        let document = render_document(template, params)?;

        let write_err = |source| TemplateError::Write {
            path: path.display().to_string(),
            source,
        };
        fs::create_dir_all(&self.options_dir)
            .await
            .map_err(write_err)?;
        fs::write(&path, document.as_bytes())
            .await
            .map_err(write_err)?;

        debug!(path = %path.display(), "Rendered options document");
        Ok(path)
    }
}

fn validate_vm_name(vm_name: &str) -> Result<(), TemplateError> {
    let unsafe_name = vm_name.is_empty()
        || vm_name.starts_with('.')
        || vm_name.contains("..")
        || vm_name.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(TemplateError::InvalidVmName(vm_name.to_string()));
    }
    Ok(())
}

/// Render a template to JSON text without touching the filesystem
pub fn render_document(
    template: &Value,
    params: &ResolvedParams,
) -> Result<String, TemplateError> {
    let text = serde_json::to_string(template).map_err(TemplateError::Serialize)?;
    render_text(&text, params)
}

/// Render serialized template text; the result must parse as JSON
pub fn render_text(text: &str, params: &ResolvedParams) -> Result<String, TemplateError> {
    let vars = template_vars(params)?;
    let rendered = substitute(text, &vars)?;

    serde_json::from_str::<Value>(&rendered).map_err(TemplateError::InvalidDocument)?;
    Ok(rendered)
}

/// Template variables, escaped for insertion inside JSON strings
fn template_vars(
    params: &ResolvedParams,
) -> Result<BTreeMap<&'static str, String>, TemplateError> {
    let raw = [
        ("zpod_hostname", params.hostname.clone()),
        ("zpod_ipaddress", params.ip.to_string()),
        ("zpod_netmask", params.netmask.to_string()),
        ("zpod_netprefix", params.prefix_len().to_string()),
        ("zpod_gateway", params.gateway.to_string()),
        ("zpod_dns", params.dns.clone()),
        ("zpod_ntp", params.ntp.clone()),
        ("zpod_domain", params.domain.clone()),
        ("zpod_password", params.password.clone()),
        ("zpod_sshkey", params.ssh_key.clone()),
        ("zpod_portgroup", params.network_segment().to_string()),
    ];

    raw.into_iter()
        .map(|(name, value)| Ok((name, escape_json(&value)?)))
        .collect()
}

fn escape_json(value: &str) -> Result<String, TemplateError> {
    let quoted = serde_json::to_string(value).map_err(TemplateError::Serialize)?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

/// Replace every `{{ name }}` in `text`; unknown or unterminated placeholders are errors
fn substitute(text: &str, vars: &BTreeMap<&str, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];

        let Some(end) = after.find(CLOSE) else {
            let fragment: String = after.chars().take(32).collect();
            return Err(TemplateError::UnresolvedPlaceholder(
                fragment.trim().to_string(),
            ));
        };

        let name = after[..end].trim();
        let value = vars
            .get(name)
            .ok_or_else(|| TemplateError::UnresolvedPlaceholder(name.to_string()))?;
        out.push_str(value);
        rest = &after[end + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionEndpoint, DeployTarget, PhysicalTarget};
    use serde_json::json;
    use std::net::Ipv4Addr;

    fn params() -> ResolvedParams {
        ResolvedParams {
            hostname: "esxi12".to_string(),
            ip: Ipv4Addr::new(10, 96, 1, 12),
            netmask: Ipv4Addr::new(255, 255, 255, 192),
            gateway: Ipv4Addr::new(10, 96, 1, 1),
            dns: "10.96.1.2".to_string(),
            ntp: "10.96.0.10".to_string(),
            domain: "lab1.local".to_string(),
            password: "pa\"ss".to_string(),
            ssh_key: "ssh-ed25519 AAAA".to_string(),
            target: DeployTarget::Physical(PhysicalTarget {
                connection: ConnectionEndpoint {
                    hostname: "vc".to_string(),
                    username: "u".to_string(),
                    password: "p".to_string(),
                },
                datastore: "ds".to_string(),
                resource_pool: "sfo01-lab1".to_string(),
                network_segment: "sfo01-lab1-segment".to_string(),
            }),
        }
    }

    fn template() -> Value {
        json!({
            "DiskProvisioning": "thin",
            "Name": "{{ zpod_hostname }}.{{zpod_domain}}",
            "PropertyMapping": [
                {"Key": "guestinfo.ipaddress", "Value": "{{ zpod_ipaddress }}"},
                {"Key": "guestinfo.netprefix", "Value": "{{ zpod_netprefix }}"},
                {"Key": "guestinfo.password", "Value": "{{ zpod_password }}"}
            ],
            "NetworkMapping": [{"Name": "VM Network", "Network": "{{ zpod_portgroup }}"}]
        })
    }

    #[test]
    fn test_render_substitutes_and_escapes() {
        let rendered = render_document(&template(), &params()).unwrap();
        let doc: Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(doc["Name"], "esxi12.lab1.local");
        assert_eq!(doc["PropertyMapping"][0]["Value"], "10.96.1.12");
        assert_eq!(doc["PropertyMapping"][1]["Value"], "26");
        assert_eq!(doc["PropertyMapping"][2]["Value"], "pa\"ss");
        assert_eq!(doc["NetworkMapping"][0]["Network"], "sfo01-lab1-segment");
    }

    #[test]
    fn test_render_is_idempotent() {
        let first = render_document(&template(), &params()).unwrap();
        let second = render_document(&template(), &params()).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let template = json!({"Name": "{{ zpod_hostname }}", "Bad": "{{ zpod_unknown }}"});
        let err = render_document(&template, &params()).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnresolvedPlaceholder(ref n) if n == "zpod_unknown"
        ));
    }

    #[test]
    fn test_unterminated_placeholder_is_error() {
        let template = json!({"Name": "{{ zpod_hostname"});
        let err = render_document(&template, &params()).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedPlaceholder(_)));
    }

    #[test]
    fn test_invalid_document_is_error() {
        let err = render_text("{\"Name\": {{ zpod_hostname }}}", &params()).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidDocument(_)));

        let ok = render_text("{\"Prefix\": {{ zpod_netprefix }}}", &params()).unwrap();
        assert_eq!(ok, "{\"Prefix\": 26}");
    }

    #[tokio::test]
    async fn test_render_writes_options_file() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = TemplateRenderer::new(dir.path());

        let path = renderer.render(&template(), &params()).await.unwrap();
        assert_eq!(path, dir.path().join("esxi12.lab1.local.json"));

        let first = std::fs::read(&path).unwrap();
        renderer.render(&template(), &params()).await.unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_hostname_cannot_leave_options_dir() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let options_dir = root.path().join("options");
        let renderer = TemplateRenderer::new(&options_dir);

        let escapes = [
            format!("{}/evil", outside.path().display()),
            "../evil".to_string(),
            "a\\b".to_string(),
            String::new(),
        ];
        for hostname in escapes {
            let mut p = params();
            p.hostname = hostname.clone();

            let err = renderer.render(&template(), &p).await.unwrap_err();
            assert!(
                matches!(err, TemplateError::InvalidVmName(_)),
                "hostname {:?} accepted",
                hostname
            );
        }

        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
        assert!(!options_dir.exists());
    }
}
