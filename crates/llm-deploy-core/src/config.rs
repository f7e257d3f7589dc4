//! Deployment configuration.
//!
//! A `DeployConfig` is resolved once at startup by overlaying an optional
//! user-supplied JSON file onto built-in defaults, and is read-only for the
//! rest of the run. The overlay is typed: each file key is an `Option` so
//! "present in file" and "absent, keep default" stay distinguishable.
//!
//! Bad configuration never aborts a deployment. A missing file silently
//! yields defaults; a malformed one yields defaults plus a warning on the
//! event stream.

use crate::event::{EventEmitter, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file path when no argument is given.
pub const DEFAULT_CONFIG_PATH: &str = "./llm_config.json";

/// The inference runtime being deployed.
///
/// Only Ollama is supported today, but the config carries the runtime as a
/// string so unknown values round-trip to the caller unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Ollama,
}

impl RuntimeKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(RuntimeKind::Ollama),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Ollama => "ollama",
        }
    }

    /// Name of the runtime binary, also used as the systemd service name.
    pub fn binary_name(&self) -> &'static str {
        match self {
            RuntimeKind::Ollama => "ollama",
        }
    }

    /// Vendor-provided install script, piped through `sh`.
    pub fn install_script_url(&self) -> &'static str {
        match self {
            RuntimeKind::Ollama => "https://ollama.com/install.sh",
        }
    }

    /// Path of the HTTP endpoint that lists installed models.
    pub fn tags_path(&self) -> &'static str {
        match self {
            RuntimeKind::Ollama => "/api/tags",
        }
    }

    /// Dedicated low-privilege account the service runs as.
    pub fn service_user(&self) -> &'static str {
        match self {
            RuntimeKind::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved deployment configuration.
///
/// Field names serialize with the wire protocol's key names so the terminal
/// completion event echoes the config exactly as the caller supplied it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    pub llm_type: String,
    pub models: Vec<String>,
    pub port: u16,
    pub host: String,
    pub install_path: PathBuf,
    pub data_path: PathBuf,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            llm_type: "ollama".to_string(),
            models: vec!["llama2:7b".to_string()],
            port: 11434,
            host: "0.0.0.0".to_string(),
            install_path: PathBuf::from("/opt/llm"),
            data_path: PathBuf::from("/opt/llm/data"),
        }
    }
}

impl DeployConfig {
    /// Resolve the configuration from an optional file.
    ///
    /// Missing or unreadable file: defaults, no warning. Present but
    /// malformed: defaults plus a warning-level event. A deployment is
    /// never aborted over configuration alone.
    pub fn resolve(path: &Path, emitter: &EventEmitter) -> Self {
        let defaults = Self::default();

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return defaults,
        };

        let config = match serde_json::from_str::<ConfigOverlay>(&raw) {
            Ok(overlay) => overlay.apply(defaults),
            Err(e) => {
                emitter.log(
                    LogLevel::Warn,
                    format!(
                        "Failed to parse config {}: {}. Using defaults.",
                        path.display(),
                        e
                    ),
                );
                defaults
            }
        };

        if RuntimeKind::from_str(&config.llm_type).is_none() {
            emitter.log(
                LogLevel::Warn,
                format!(
                    "Unsupported llm_type '{}'; deploying {} instead",
                    config.llm_type,
                    config.runtime()
                ),
            );
        }

        config
    }

    /// The runtime kind this config deploys.
    ///
    /// Unrecognized `llm_type` values fall back to Ollama; the resolver
    /// warns about them but the raw string is preserved for echo-back.
    pub fn runtime(&self) -> RuntimeKind {
        RuntimeKind::from_str(&self.llm_type).unwrap_or(RuntimeKind::Ollama)
    }

    /// Base URL for probing the service from the deployment host itself.
    /// The service may bind 0.0.0.0; the probe always goes via loopback.
    pub fn local_base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// Keys that may appear in the configuration file.
///
/// Every field is optional; present keys override defaults, absent keys keep
/// them. This makes the shallow-overlay semantics explicit and testable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverlay {
    pub llm_type: Option<String>,
    pub models: Option<Vec<String>>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub install_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl ConfigOverlay {
    /// Overlay the present keys onto `base`.
    pub fn apply(self, base: DeployConfig) -> DeployConfig {
        DeployConfig {
            llm_type: self.llm_type.unwrap_or(base.llm_type),
            models: self.models.unwrap_or(base.models),
            port: self.port.unwrap_or(base.port),
            host: self.host.unwrap_or(base.host),
            install_path: self.install_path.unwrap_or(base.install_path),
            data_path: self.data_path.unwrap_or(base.data_path),
        }
    }
}

/// Timeouts and polling parameters for deployment steps.
pub struct DeployTuning;

impl DeployTuning {
    /// Quick status probes (`--version`, `is-active`).
    pub const QUICK_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
    /// Package-manager and vendor install script runs.
    pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(600);
    /// Model pulls are large network transfers.
    pub const MODEL_PULL_TIMEOUT: Duration = Duration::from_secs(3600);

    /// Overall deadline for the service to report active after start.
    pub const SERVICE_READY_TIMEOUT: Duration = Duration::from_secs(30);
    /// First readiness poll interval; doubles per attempt.
    pub const READY_POLL_INITIAL: Duration = Duration::from_millis(500);
    /// Cap on the backoff interval.
    pub const READY_POLL_MAX: Duration = Duration::from_secs(5);

    /// Health endpoint probe timeout.
    pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
}
