//! Deployment engine for provisioning a local LLM inference service.
//!
//! This crate is the core of `llm-deploy`: a program copied onto a target
//! Linux host that installs an inference runtime (Ollama), registers and
//! starts it as a systemd service, pulls the configured models, verifies
//! the running service, and reports structured progress over stdout as
//! line-delimited JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_deploy_core::{
//!     CancellationToken, DeployConfig, EventEmitter, Orchestrator, ShellExecutor,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let emitter = Arc::new(EventEmitter::stdout());
//!     let config = DeployConfig::resolve(Path::new("./llm_config.json"), &emitter);
//!     let executor = Arc::new(ShellExecutor::new(CancellationToken::new()));
//!     let code = Orchestrator::new(config, emitter, executor).run().await;
//!     std::process::exit(code);
//! }
//! ```

pub mod cancel;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod steps;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use command::{CommandExecutor, CommandOutput, CommandRunner, ShellExecutor};
pub use config::{ConfigOverlay, DeployConfig, DeployTuning, RuntimeKind, DEFAULT_CONFIG_PATH};
pub use error::{DeployError, Result};
pub use event::{DeployEvent, EventBuffer, EventEmitter, LogLevel};
pub use orchestrator::{ArtifactLedger, DeployStage, Orchestrator};
pub use steps::ServiceTuning;
