//! Pre/post deployment scripts
//!
//! Scripts are opaque hooks: each phase either passes or fails the stage.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{Component, InstanceComponent};
use crate::infra::{CommandError, CommandRunner};

use super::deploy::ScriptError;

/// Script phase around the Deploy stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptPhase {
    Pre,
    Post,
}

impl ScriptPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptPhase::Pre => "pre",
            ScriptPhase::Post => "post",
        }
    }
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(
        &self,
        phase: ScriptPhase,
        instance_component: &InstanceComponent,
        component: &Component,
    ) -> Result<(), ScriptError>;
}

/// Runs `{scripts_dir}/{component}/{phase}.sh` when present
#[derive(Clone, Debug)]
pub struct HookScriptRunner {
    scripts_dir: Option<PathBuf>,
    timeout: Duration,
}

impl HookScriptRunner {
    pub fn new(scripts_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            scripts_dir,
            timeout,
        }
    }

    fn script_path(&self, phase: ScriptPhase, component: &Component) -> Option<PathBuf> {
        let path = self
            .scripts_dir
            .as_ref()?
            .join(&component.name)
            .join(format!("{}.sh", phase.as_str()));
        path.is_file().then_some(path)
    }
}

#[async_trait]
impl ScriptRunner for HookScriptRunner {
    async fn run(
        &self,
        phase: ScriptPhase,
        instance_component: &InstanceComponent,
        component: &Component,
    ) -> Result<(), ScriptError> {
        let Some(script) = self.script_path(phase, component) else {
            debug!(key = %instance_component.key, %phase, "No script configured, skipping");
            return Ok(());
        };

        let key = &instance_component.key;
        let mut envs = vec![
            ("ZPOD_INSTANCE_ID".to_string(), key.instance_id.to_string()),
            ("ZPOD_COMPONENT_UID".to_string(), key.component_uid.clone()),
            ("ZPOD_EXTRA_ID".to_string(), key.extra_id.clone()),
        ];
        if let Some(ref hostname) = instance_component.hostname {
            envs.push(("ZPOD_HOSTNAME".to_string(), hostname.clone()));
        }

        info!(key = %key, %phase, script = %script.display(), "Running script");

        let phase_name = phase.as_str();
        let output = CommandRunner::run_with_timeout(
            "sh",
            &[script.display().to_string()],
            &envs,
            self.timeout,
        )
        .await
        .map_err(|e| ScriptError::Launch {
            phase: phase_name,
            message: match e {
                CommandError::Timeout(d) => format!("timed out after {:?}", d),
                other => other.to_string(),
            },
        })?;

        if !output.success() {
            warn!(key = %key, %phase, exit_code = ?output.code(), "Script failed");
            return Err(ScriptError::Failed {
                phase: phase_name,
                exit_code: output.code(),
                stderr: output.stderr,
            });
        }

        Ok(())
    }
}
