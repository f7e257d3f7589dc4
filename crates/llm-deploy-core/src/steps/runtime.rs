//! Inference runtime installation.
//!
//! Idempotent: a runtime that already answers `--version` is left alone.
//! Otherwise the vendor install script is fetched and run, and the binary
//! re-verified. A runtime that still does not answer after installation is
//! fatal; there is no retry and no partial cleanup.

use crate::command::CommandRunner;
use crate::config::{DeployTuning, RuntimeKind};
use crate::error::{DeployError, Result};
use crate::event::{EventEmitter, LogLevel};

pub struct RuntimeInstaller<'a> {
    runner: &'a CommandRunner,
    emitter: &'a EventEmitter,
    runtime: RuntimeKind,
}

impl<'a> RuntimeInstaller<'a> {
    pub fn new(runner: &'a CommandRunner, emitter: &'a EventEmitter, runtime: RuntimeKind) -> Self {
        Self {
            runner,
            emitter,
            runtime,
        }
    }

    /// Install the runtime binary unless it is already callable.
    pub async fn ensure_installed(&self) -> Result<()> {
        let binary = self.runtime.binary_name();

        let probe = self
            .runner
            .run_unchecked(
                &format!("{} --version", binary),
                DeployTuning::QUICK_COMMAND_TIMEOUT,
            )
            .await?;
        if probe.success() {
            self.emitter
                .log(LogLevel::Info, format!("{} already installed", self.runtime));
            return Ok(());
        }

        self.emitter.log(
            LogLevel::Info,
            format!("Downloading and installing {}", self.runtime),
        );
        self.runner
            .run(
                &format!("curl -fsSL {} | sh", self.runtime.install_script_url()),
                DeployTuning::INSTALL_TIMEOUT,
            )
            .await
            .map_err(|e| install(format!("Install script failed: {}", e)))?;

        // The script reported success; the binary must now answer.
        self.runner
            .run(
                &format!("{} --version", binary),
                DeployTuning::QUICK_COMMAND_TIMEOUT,
            )
            .await
            .map_err(|e| install(format!("Runtime not callable after install: {}", e)))?;

        self.emitter
            .log(LogLevel::Info, format!("{} installed successfully", self.runtime));
        Ok(())
    }
}

fn install(message: String) -> DeployError {
    DeployError::Install { message }
}
