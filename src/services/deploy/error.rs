//! Deployment error taxonomy

use std::time::Duration;
use thiserror::Error;

use crate::domain::{ComponentKey, StageName};

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// A required network role has no address
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("No {role} address found for {subject}")]
pub struct NetworkResolutionError {
    /// Role that failed to resolve ("component", "gw", "zbox", ...)
    pub role: String,
    /// What was being looked up (instance name or component key)
    pub subject: String,
}

/// Options template could not be rendered into a valid document
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Unresolved template placeholder: {0}")]
    UnresolvedPlaceholder(String),

    /// The VM name cannot be used as a file name inside the options directory
    #[error("Invalid VM name: {0:?}")]
    InvalidVmName(String),

    #[error("Rendered template is not valid JSON: {0}")]
    InvalidDocument(#[source] serde_json::Error),

    #[error("Failed to serialize template: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to write options file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Hypervisor import failed
#[derive(Debug, Error)]
pub enum ImportError {
    /// The import tool ran and exited nonzero
    #[error("Import tool failed (exit code {}): {stderr}", display_code(.exit_code))]
    ImportTool {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The import tool could not be launched at all
    #[error("Failed to launch import tool: {0}")]
    UnexpectedProcess(#[source] std::io::Error),

    #[error("Import did not finish within {0:?}")]
    Timeout(Duration),
}

/// Pre/post deployment script failed
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("{phase} script exited with code {}: {stderr}", display_code(.exit_code))]
    Failed {
        phase: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to run {phase} script: {message}")]
    Launch {
        phase: &'static str,
        message: String,
    },
}

/// Error raised inside a pipeline stage
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    NetworkResolution(#[from] NetworkResolutionError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("{0} not found")]
    RecordNotFound(String),

    #[error("Component {0} is already deployed")]
    AlreadyDeployed(ComponentKey),

    #[error("Stage {0} received no input from its predecessor")]
    MissingInput(StageName),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_tool_message_keeps_stderr() {
        let err = ImportError::ImportTool {
            exit_code: Some(1),
            stderr: "govc: no such datastore".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Import tool failed (exit code 1): govc: no such datastore"
        );
    }

    #[test]
    fn test_deploy_error_is_transparent() {
        let err: DeployError = NetworkResolutionError {
            role: "gw".to_string(),
            subject: "lab1".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "No gw address found for lab1");
    }
}
