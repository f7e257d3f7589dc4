//! Error types for the deployment engine.
//!
//! Each deployment step maps its failures into a dedicated variant so the
//! orchestrator can report which stage broke. Config parse problems are
//! deliberately not represented here: bad configuration downgrades to a
//! warning and defaults, it never fails a run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for deployment operations.
#[derive(Debug, Error)]
pub enum DeployError {
    // Precondition failures
    #[error("System requirement not met: {message}")]
    Requirement { message: String },

    // Runtime installation failures
    #[error("Runtime installation failed: {message}")]
    Install { message: String },

    // Service registration/startup failures
    #[error("Service start failed: {message}")]
    ServiceStart { message: String },

    #[error("Service '{service}' did not become active within {timeout:?}")]
    ServiceNotReady { service: String, timeout: Duration },

    // Model download failures
    #[error("Model download failed for '{model}': {message}")]
    ModelDownload { model: String, message: String },

    // Post-install verification failures
    #[error("Installation verification failed: {message}")]
    Verification { message: String },

    // Command execution failures
    #[error("Command `{command}` exited with status {code}: {stderr}")]
    Command {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Failed to spawn command `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("Deployment cancelled")]
    Cancelled,

    // Ambient failures
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Result type alias for deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl From<std::io::Error> for DeployError {
    fn from(err: std::io::Error) -> Self {
        DeployError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        DeployError::Http {
            message: err.to_string(),
        }
    }
}

impl DeployError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DeployError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// The deployment stage this error belongs to, for the terminal
    /// error event message.
    pub fn stage_label(&self) -> &'static str {
        match self {
            DeployError::Requirement { .. } => "requirement check",
            DeployError::Install { .. } => "runtime installation",
            DeployError::ServiceStart { .. } | DeployError::ServiceNotReady { .. } => {
                "service start"
            }
            DeployError::ModelDownload { .. } => "model download",
            DeployError::Verification { .. } => "verification",
            DeployError::Cancelled => "cancelled",
            _ => "deployment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeployError::ModelDownload {
            model: "llama2:7b".into(),
            message: "pull failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "Model download failed for 'llama2:7b': pull failed"
        );
    }

    #[test]
    fn test_stage_labels() {
        let err = DeployError::ServiceNotReady {
            service: "ollama".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.stage_label(), "service start");

        let err = DeployError::Requirement {
            message: "curl missing".into(),
        };
        assert_eq!(err.stage_label(), "requirement check");
    }
}
