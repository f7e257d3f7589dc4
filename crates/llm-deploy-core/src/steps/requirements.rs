//! System requirement checks.
//!
//! Verifies the host has the tools the later steps shell out to. The only
//! opportunistic repair is installing curl through the platform package
//! manager; if that also fails the run aborts. This is a fatal,
//! non-retried precondition check.

use crate::command::CommandRunner;
use crate::config::DeployTuning;
use crate::error::{DeployError, Result};
use crate::event::{EventEmitter, LogLevel};

pub struct RequirementChecker<'a> {
    runner: &'a CommandRunner,
    emitter: &'a EventEmitter,
}

impl<'a> RequirementChecker<'a> {
    pub fn new(runner: &'a CommandRunner, emitter: &'a EventEmitter) -> Self {
        Self { runner, emitter }
    }

    /// Verify shell execution, systemd, and curl availability.
    pub async fn ensure(&self) -> Result<()> {
        // Proves command execution works at all and records the host kernel.
        self.runner
            .run("uname -sr", DeployTuning::QUICK_COMMAND_TIMEOUT)
            .await
            .map_err(|e| requirement(format!("Shell execution unavailable: {}", e)))?;

        // Later steps register a systemd unit; without systemd there is
        // nothing to deploy onto.
        let systemd = self
            .runner
            .run_unchecked("systemctl --version", DeployTuning::QUICK_COMMAND_TIMEOUT)
            .await?;
        if !systemd.success() {
            return Err(requirement(
                "systemctl not available; a systemd-compatible init is required".to_string(),
            ));
        }

        self.ensure_curl().await
    }

    /// Check for curl, installing it once via apt if missing.
    async fn ensure_curl(&self) -> Result<()> {
        let probe = self
            .runner
            .run_unchecked("curl --version", DeployTuning::QUICK_COMMAND_TIMEOUT)
            .await?;
        if probe.success() {
            self.emitter.log(LogLevel::Info, "curl available");
            return Ok(());
        }

        self.emitter
            .log(LogLevel::Warn, "curl not found, attempting install");
        self.runner
            .run(
                "sudo apt-get update && sudo apt-get install -y curl",
                DeployTuning::INSTALL_TIMEOUT,
            )
            .await
            .map_err(|e| requirement(format!("Failed to install curl: {}", e)))?;

        let recheck = self
            .runner
            .run_unchecked("curl --version", DeployTuning::QUICK_COMMAND_TIMEOUT)
            .await?;
        if !recheck.success() {
            return Err(requirement(
                "curl still unavailable after install attempt".to_string(),
            ));
        }
        self.emitter.log(LogLevel::Info, "curl installed");
        Ok(())
    }
}

fn requirement(message: String) -> DeployError {
    DeployError::Requirement { message }
}
