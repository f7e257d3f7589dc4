//! Deployment steps, in execution order.
//!
//! Each step owns one stage of the run: preconditions, runtime install,
//! service registration, model fetch, verification. Steps report through
//! the shared `CommandRunner`/`EventEmitter` pair and map their failures
//! into the stage-specific `DeployError` variant.

pub mod models;
pub mod requirements;
pub mod runtime;
pub mod service;
pub mod verify;

pub use models::ModelFetcher;
pub use requirements::RequirementChecker;
pub use runtime::RuntimeInstaller;
pub use service::{ServiceManager, ServiceTuning};
pub use verify::Verifier;
