//! Model fetching.
//!
//! Pulls the configured models in order, one blocking pull at a time. Each
//! model gets a progress milestone interpolated across the 60-90 band by
//! its position in the list. The first failed pull aborts the whole step:
//! no skip-and-continue, no retry.

use crate::command::CommandRunner;
use crate::config::{DeployConfig, DeployTuning};
use crate::error::{DeployError, Result};
use crate::event::{EventEmitter, LogLevel};
use crate::orchestrator::ArtifactLedger;

/// Progress band reserved for model downloads.
const BAND_START: u32 = 60;
const BAND_WIDTH: u32 = 30;

pub struct ModelFetcher<'a> {
    runner: &'a CommandRunner,
    emitter: &'a EventEmitter,
    config: &'a DeployConfig,
}

impl<'a> ModelFetcher<'a> {
    pub fn new(
        runner: &'a CommandRunner,
        emitter: &'a EventEmitter,
        config: &'a DeployConfig,
    ) -> Self {
        Self {
            runner,
            emitter,
            config,
        }
    }

    /// Pull every configured model, in order. An empty list is a
    /// successful no-op.
    pub async fn fetch_all(&self, ledger: &mut ArtifactLedger) -> Result<()> {
        let models = &self.config.models;
        let total = models.len() as u32;
        let binary = self.config.runtime().binary_name();

        for (i, model) in models.iter().enumerate() {
            let progress = BAND_START + BAND_WIDTH * (i as u32 + 1) / total;
            self.emitter
                .progress(progress as u8, format!("Downloading model {model}"));

            self.emitter
                .log(LogLevel::Info, format!("Downloading model: {model}"));
            self.runner
                .run(
                    &format!("{binary} pull {model}"),
                    DeployTuning::MODEL_PULL_TIMEOUT,
                )
                .await
                .map_err(|e| DeployError::ModelDownload {
                    model: model.clone(),
                    message: e.to_string(),
                })?;

            self.emitter
                .log(LogLevel::Info, format!("Model {model} downloaded"));
            ledger.record(format!("model '{model}'"));
        }

        Ok(())
    }
}
