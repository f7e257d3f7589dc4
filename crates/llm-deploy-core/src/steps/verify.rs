//! Post-deployment verification.
//!
//! Probes the runtime's HTTP API on the configured port and lists the
//! installed models through the runtime's own inventory command. Any
//! failure here is fatal; the service was started but is not usable.

use crate::command::CommandRunner;
use crate::config::{DeployConfig, DeployTuning};
use crate::error::{DeployError, Result};
use crate::event::{EventEmitter, LogLevel};
use serde::Deserialize;

/// A model registered in the runtime, as returned by `GET /api/tags`.
#[derive(Debug, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// Response body of `GET /api/tags`.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<InstalledModel>>,
}

pub struct Verifier<'a> {
    runner: &'a CommandRunner,
    emitter: &'a EventEmitter,
    config: &'a DeployConfig,
}

impl<'a> Verifier<'a> {
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

    /// Health-check the API and log the model inventory.
    pub async fn verify(&self) -> Result<()> {
        let models = self.probe_api().await?;
        self.emitter.log(
            LogLevel::Info,
            format!("API healthy, {} model(s) registered", models.len()),
        );

        let binary = self.config.runtime().binary_name();
        let listing = self
            .runner
            .run(
                &format!("{binary} list"),
                DeployTuning::QUICK_COMMAND_TIMEOUT,
            )
            .await
            .map_err(|e| verification(format!("Model listing failed: {}", e)))?;

        self.emitter.log(
            LogLevel::Info,
            format!("Installed models:\n{}", listing.stdout.trim_end()),
        );
        self.emitter
            .log(LogLevel::Info, "Installation verified successfully");
        Ok(())
    }

    /// GET the tags endpoint over loopback and parse the inventory.
    async fn probe_api(&self) -> Result<Vec<InstalledModel>> {
        let url = format!(
            "{}{}",
            self.config.local_base_url(),
            self.config.runtime().tags_path()
        );
        self.emitter
            .log(LogLevel::Info, format!("Probing health endpoint {url}"));

        let client = reqwest::Client::builder()
            .timeout(DeployTuning::HEALTH_TIMEOUT)
            .user_agent("llm-deploy")
            .build()
            .map_err(|e| verification(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| verification(format!("Health check failed for {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(verification(format!(
                "Health endpoint returned {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| verification(format!("Invalid health response: {}", e)))?;
        Ok(tags.models.unwrap_or_default())
    }
}

fn verification(message: String) -> DeployError {
    DeployError::Verification { message }
}
