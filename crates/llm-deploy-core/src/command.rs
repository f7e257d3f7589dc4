//! External command execution.
//!
//! Deployment steps never talk to the OS directly; they go through a
//! `CommandRunner`, which surfaces every invocation and its captured output
//! on the event stream before handing the result back. The actual process
//! execution sits behind the `CommandExecutor` trait so tests can substitute
//! a scripted executor and never fork a real subprocess.

use crate::cancel::CancellationToken;
use crate::error::{DeployError, Result};
use crate::event::{EventEmitter, LogLevel};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; -1 when the process was terminated by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Executes a shell command and captures its output.
///
/// The production implementation forks a real shell; tests inject a
/// scripted one.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;
}

/// Executor forking `sh -c` via tokio, with a hard timeout and
/// cooperative cancellation.
pub struct ShellExecutor {
    cancel: CancellationToken,
}

impl ShellExecutor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.cancel.check()?;
        debug!("executing: {}", command);

        // kill_on_drop reaps the child when the timeout or cancellation
        // branch drops the output future.
        let output_fut = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            res = tokio::time::timeout(timeout, output_fut) => match res {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(DeployError::Spawn {
                        command: command.to_string(),
                        message: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(DeployError::CommandTimeout {
                        command: command.to_string(),
                        timeout,
                    })
                }
            },
            _ = self.cancel.cancelled() => return Err(DeployError::Cancelled),
        };

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs commands through an executor with full command-level observability
/// on the event stream.
pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
    emitter: Arc<EventEmitter>,
}

impl CommandRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>, emitter: Arc<EventEmitter>) -> Self {
        Self { executor, emitter }
    }

    /// Run a command, erroring on non-zero exit.
    ///
    /// The invocation and its captured streams are emitted as log events
    /// before the result is returned.
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let output = self.run_unchecked(command, timeout).await?;
        if !output.success() {
            self.emitter.log(
                LogLevel::Error,
                format!("Command failed with status {}: {}", output.code, command),
            );
            return Err(DeployError::Command {
                command: command.to_string(),
                code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Run a command and hand back the output regardless of exit status.
    /// Used by steps that inspect status themselves ("is the runtime
    /// already installed?").
    pub async fn run_unchecked(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.emitter
            .log(LogLevel::Info, format!("Running command: {}", command));

        let output = match self.executor.execute(command, timeout).await {
            Ok(output) => output,
            Err(e) => {
                self.emitter
                    .log(LogLevel::Error, format!("Command error: {}", e));
                return Err(e);
            }
        };

        if !output.stdout.is_empty() {
            self.emitter
                .log(LogLevel::Info, format!("STDOUT: {}", output.stdout.trim_end()));
        }
        if !output.stderr.is_empty() {
            self.emitter
                .log(LogLevel::Warn, format!("STDERR: {}", output.stderr.trim_end()));
        }

        Ok(output)
    }
}
