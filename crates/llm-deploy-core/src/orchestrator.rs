//! Deployment orchestration.
//!
//! Drives the steps through a forward-only state machine:
//! `Init -> CheckingRequirements -> InstallingRuntime -> StartingService ->
//! DownloadingModels -> Verifying -> Done | Failed`. The first error from
//! any stage transitions to `Failed`, which reports host artifacts created
//! so far as left in place, emits exactly one terminal error event, and
//! maps to exit code 1. `Done` emits exactly one completion event echoing
//! the resolved configuration and maps to exit code 0.

use crate::command::{CommandExecutor, CommandRunner};
use crate::config::DeployConfig;
use crate::error::Result;
use crate::event::{EventEmitter, LogLevel};
use crate::steps::{
    ModelFetcher, RequirementChecker, RuntimeInstaller, ServiceManager, ServiceTuning, Verifier,
};
use std::sync::Arc;
use tracing::info;

/// Stages of one deployment run. No stage is re-entered and there is no
/// backward transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    Init,
    CheckingRequirements,
    InstallingRuntime,
    StartingService,
    DownloadingModels,
    Verifying,
    Done,
    Failed,
}

impl DeployStage {
    /// Progress milestone emitted on entering the stage.
    fn milestone(&self) -> Option<u8> {
        match self {
            DeployStage::Init => Some(0),
            DeployStage::CheckingRequirements => Some(5),
            DeployStage::InstallingRuntime => Some(20),
            DeployStage::StartingService => Some(40),
            DeployStage::DownloadingModels => Some(60),
            DeployStage::Verifying => Some(95),
            DeployStage::Done => Some(100),
            DeployStage::Failed => None,
        }
    }
}

/// Host state created during the run.
///
/// Nothing is rolled back on failure; the ledger lets the failure path
/// tell the operator exactly what was left behind for inspection.
#[derive(Debug, Default)]
pub struct ArtifactLedger {
    entries: Vec<String>,
}

impl ArtifactLedger {
    pub fn record(&mut self, artifact: String) {
        self.entries.push(artifact);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Report everything created so far as warn-level events. Called on
    /// the failure path, before the terminal event.
    fn report_left_behind(&self, emitter: &EventEmitter) {
        for artifact in &self.entries {
            emitter.log(
                LogLevel::Warn,
                format!("Left in place after failure: {artifact}"),
            );
        }
    }
}

/// Sequences the deployment steps and owns the terminal-event contract.
pub struct Orchestrator {
    config: DeployConfig,
    emitter: Arc<EventEmitter>,
    runner: CommandRunner,
    service_tuning: ServiceTuning,
    stage: DeployStage,
}

impl Orchestrator {
    pub fn new(
        config: DeployConfig,
        emitter: Arc<EventEmitter>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let runner = CommandRunner::new(executor, emitter.clone());
        Self {
            config,
            emitter,
            runner,
            service_tuning: ServiceTuning::default(),
            stage: DeployStage::Init,
        }
    }

    /// Override readiness polling parameters. Tests use this to avoid the
    /// production deadline.
    pub fn with_service_tuning(mut self, tuning: ServiceTuning) -> Self {
        self.service_tuning = tuning;
        self
    }

    /// Run the full deployment and return the process exit code.
    ///
    /// Exactly one terminal event is emitted: `complete` on success,
    /// `error` on the first fatal failure.
    pub async fn run(mut self) -> i32 {
        let mut ledger = ArtifactLedger::default();

        match self.deploy(&mut ledger).await {
            Ok(()) => {
                self.stage = DeployStage::Done;
                self.emitter
                    .complete("LLM server deployed successfully", &self.config);
                0
            }
            Err(e) => {
                self.stage = DeployStage::Failed;
                ledger.report_left_behind(&self.emitter);
                self.emitter
                    .error(format!("Deployment failed during {}: {}", e.stage_label(), e));
                1
            }
        }
    }

    async fn deploy(&mut self, ledger: &mut ArtifactLedger) -> Result<()> {
        self.enter(DeployStage::Init, "Starting LLM server deployment");

        self.enter(DeployStage::CheckingRequirements, "Checking system requirements");
        RequirementChecker::new(&self.runner, self.emitter.as_ref())
            .ensure()
            .await?;

        let runtime = self.config.runtime();
        self.enter(
            DeployStage::InstallingRuntime,
            format!("Installing {runtime}"),
        );
        RuntimeInstaller::new(&self.runner, self.emitter.as_ref(), runtime)
            .ensure_installed()
            .await?;

        self.enter(DeployStage::StartingService, format!("Starting {runtime} service"));
        ServiceManager::new(
            &self.runner,
            self.emitter.as_ref(),
            &self.config,
            self.service_tuning.clone(),
        )
        .start(ledger)
        .await?;

        self.enter(DeployStage::DownloadingModels, "Downloading LLM models");
        ModelFetcher::new(&self.runner, self.emitter.as_ref(), &self.config)
            .fetch_all(ledger)
            .await?;

        self.enter(DeployStage::Verifying, "Verifying installation");
        Verifier::new(&self.runner, self.emitter.as_ref(), &self.config)
            .verify()
            .await?;

        self.enter(DeployStage::Done, "Deployment completed successfully");
        Ok(())
    }

    /// Transition forward into a stage and emit its progress milestone.
    fn enter(&mut self, stage: DeployStage, message: impl Into<String>) {
        debug_assert!(
            self.stage != stage || stage == DeployStage::Init,
            "stage re-entered: {stage:?}"
        );
        self.stage = stage;
        let message = message.into();
        info!(?stage, "{}", message);
        if let Some(progress) = stage.milestone() {
            self.emitter.progress(progress, message);
        }
    }

    /// Current stage, for observability.
    pub fn stage(&self) -> DeployStage {
        self.stage
    }
}
