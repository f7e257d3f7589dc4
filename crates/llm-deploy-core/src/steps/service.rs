//! Service registration and startup.
//!
//! Writes a systemd unit parameterized by the configured host/port, enables
//! it for start-on-boot, starts it, and polls `systemctl is-active` with
//! backoff until the service reports active or the deadline passes. Nothing
//! created here is rolled back on failure; the orchestrator reports the
//! artifacts as left in place.

use crate::command::CommandRunner;
use crate::config::{DeployConfig, DeployTuning};
use crate::error::{DeployError, Result};
use crate::event::{EventEmitter, LogLevel};
use crate::orchestrator::ArtifactLedger;
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;

/// Readiness-poll parameters, injectable so tests do not sit through the
/// production deadline.
#[derive(Debug, Clone)]
pub struct ServiceTuning {
    pub ready_timeout: Duration,
    pub poll_initial: Duration,
    pub poll_max: Duration,
}

impl Default for ServiceTuning {
    fn default() -> Self {
        Self {
            ready_timeout: DeployTuning::SERVICE_READY_TIMEOUT,
            poll_initial: DeployTuning::READY_POLL_INITIAL,
            poll_max: DeployTuning::READY_POLL_MAX,
        }
    }
}

pub struct ServiceManager<'a> {
    runner: &'a CommandRunner,
    emitter: &'a EventEmitter,
    config: &'a DeployConfig,
    tuning: ServiceTuning,
}

impl<'a> ServiceManager<'a> {
    pub fn new(
        runner: &'a CommandRunner,
        emitter: &'a EventEmitter,
        config: &'a DeployConfig,
        tuning: ServiceTuning,
    ) -> Self {
        Self {
            runner,
            emitter,
            config,
            tuning,
        }
    }

    /// Register, enable, and start the service, then wait for it to
    /// report active.
    pub async fn start(&self, ledger: &mut ArtifactLedger) -> Result<()> {
        let runtime = self.config.runtime();
        let service = runtime.binary_name();
        let user = runtime.service_user();

        // Dedicated low-privilege account. "already exists" (or any other
        // useradd failure) is tolerated; a usable account is confirmed by
        // the service starting.
        self.runner
            .run_unchecked(
                &format!(
                    "sudo useradd -r -s /bin/false -m -d /usr/share/{user} {user}"
                ),
                DeployTuning::QUICK_COMMAND_TIMEOUT,
            )
            .await?;
        ledger.record(format!("service account '{user}'"));

        self.install_unit(ledger).await?;

        for command in [
            "sudo systemctl daemon-reload".to_string(),
            format!("sudo systemctl enable {service}"),
            format!("sudo systemctl start {service}"),
        ] {
            self.runner
                .run(&command, DeployTuning::QUICK_COMMAND_TIMEOUT)
                .await
                .map_err(|e| DeployError::ServiceStart {
                    message: e.to_string(),
                })?;
        }

        self.wait_until_active(service).await?;
        self.emitter
            .log(LogLevel::Info, format!("{service} service is active"));
        Ok(())
    }

    /// Render the unit file contents for the configured host/port.
    fn render_unit(&self) -> String {
        let runtime = self.config.runtime();
        format!(
            "[Unit]\n\
             Description=Ollama Server\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             ExecStart=/usr/local/bin/{binary} serve\n\
             User={user}\n\
             Group={user}\n\
             Restart=always\n\
             RestartSec=3\n\
             Environment=\"OLLAMA_HOST={host}:{port}\"\n\
             \n\
             [Install]\n\
             WantedBy=default.target\n",
            binary = runtime.binary_name(),
            user = runtime.service_user(),
            host = self.config.host,
            port = self.config.port,
        )
    }

    /// Stage the unit in a temp file, then move it into the systemd unit
    /// directory with elevated privileges.
    async fn install_unit(&self, ledger: &mut ArtifactLedger) -> Result<()> {
        let service = self.config.runtime().binary_name();
        let unit_path = format!("/etc/systemd/system/{service}.service");

        let mut staged = tempfile::NamedTempFile::new().map_err(|e| DeployError::ServiceStart {
            message: format!("Failed to stage unit file: {}", e),
        })?;
        staged
            .write_all(self.render_unit().as_bytes())
            .map_err(|e| DeployError::ServiceStart {
                message: format!("Failed to write unit file: {}", e),
            })?;
        // Keep the file past drop; `mv` consumes it.
        let (_, staged_path) = staged.keep().map_err(|e| DeployError::ServiceStart {
            message: format!("Failed to persist staged unit file: {}", e),
        })?;

        self.runner
            .run(
                &format!("sudo mv {} {}", staged_path.display(), unit_path),
                DeployTuning::QUICK_COMMAND_TIMEOUT,
            )
            .await
            .map_err(|e| DeployError::ServiceStart {
                message: format!("Failed to install unit file: {}", e),
            })?;
        ledger.record(format!("unit file {unit_path}"));
        Ok(())
    }

    /// Poll `systemctl is-active` with doubling backoff until active or
    /// the deadline passes.
    async fn wait_until_active(&self, service: &str) -> Result<()> {
        let deadline = Instant::now() + self.tuning.ready_timeout;
        let mut interval = self.tuning.poll_initial;

        loop {
            let probe = self
                .runner
                .run_unchecked(
                    &format!("systemctl is-active {service}"),
                    DeployTuning::QUICK_COMMAND_TIMEOUT,
                )
                .await?;
            if probe.success() && probe.stdout.trim() == "active" {
                return Ok(());
            }

            if Instant::now() + interval > deadline {
                return Err(DeployError::ServiceNotReady {
                    service: service.to_string(),
                    timeout: self.tuning.ready_timeout,
                });
            }
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(self.tuning.poll_max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::command::{CommandRunner, ShellExecutor};
    use crate::event::EventEmitter;
    use std::sync::Arc;

    fn manager_fixture() -> (CommandRunner, EventEmitter) {
        let (emitter, _) = EventEmitter::buffered();
        let runner = CommandRunner::new(
            Arc::new(ShellExecutor::new(CancellationToken::new())),
            Arc::new(EventEmitter::buffered().0),
        );
        (runner, emitter)
    }

    #[test]
    fn test_unit_renders_configured_endpoint() {
        let config = DeployConfig {
            host: "0.0.0.0".into(),
            port: 9000,
            ..DeployConfig::default()
        };
        let (runner, emitter) = manager_fixture();
        let manager = ServiceManager::new(&runner, &emitter, &config, ServiceTuning::default());

        let unit = manager.render_unit();
        assert!(unit.contains("Environment=\"OLLAMA_HOST=0.0.0.0:9000\""));
        assert!(unit.contains("ExecStart=/usr/local/bin/ollama serve"));
        assert!(unit.contains("User=ollama"));
        assert!(unit.contains("Restart=always"));
    }

    #[test]
    fn test_unit_has_install_section() {
        let config = DeployConfig::default();
        let (runner, emitter) = manager_fixture();
        let manager = ServiceManager::new(&runner, &emitter, &config, ServiceTuning::default());

        let unit = manager.render_unit();
        assert!(unit.contains("[Install]\nWantedBy=default.target"));
    }
}
