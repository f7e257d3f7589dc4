//! End-to-end deployment flow tests.
//!
//! The orchestrator is driven with a scripted command executor that records
//! every invocation and returns canned outputs, so no test forks a real
//! subprocess or touches systemd. The health probe is served by a local
//! TCP listener speaking just enough HTTP for the tags endpoint.

use async_trait::async_trait;
use llm_deploy_core::{
    CommandExecutor, CommandOutput, DeployConfig, EventEmitter, Orchestrator, Result,
    ServiceTuning,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn ok() -> CommandOutput {
    CommandOutput {
        code: 0,
        stdout: String::new(),
        stderr: String::new(),
    }
}

fn ok_with(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

struct Rule {
    pattern: String,
    outputs: VecDeque<CommandOutput>,
}

/// Executor returning scripted outputs, matched by substring. Commands
/// with no matching rule succeed with empty output. A rule scripted with
/// several outputs yields them in order, repeating the last.
#[derive(Default)]
struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new() -> Self {
        Self::default()
    }

    fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.on_seq(pattern, vec![output])
    }

    fn on_seq(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            outputs: outputs.into(),
        });
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &str, _timeout: Duration) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.to_string());

        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if command.contains(&rule.pattern) {
                let output = if rule.outputs.len() > 1 {
                    rule.outputs.pop_front().unwrap()
                } else {
                    rule.outputs.front().cloned().unwrap_or_else(ok)
                };
                return Ok(output);
            }
        }
        Ok(ok())
    }
}

/// Serve `{"models":[]}` at any path on an ephemeral port.
async fn spawn_health_endpoint() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let body = r#"{"models":[{"name":"llama2:7b","size":1}]}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    port
}

/// Readiness polling tuned so failure scenarios finish in milliseconds.
fn fast_tuning() -> ServiceTuning {
    ServiceTuning {
        ready_timeout: Duration::from_millis(100),
        poll_initial: Duration::from_millis(10),
        poll_max: Duration::from_millis(20),
    }
}

async fn run_deploy(
    config: DeployConfig,
    executor: Arc<ScriptedExecutor>,
) -> (i32, Vec<serde_json::Value>) {
    let (emitter, buffer) = EventEmitter::buffered();
    let code = Orchestrator::new(config, Arc::new(emitter), executor)
        .with_service_tuning(fast_tuning())
        .run()
        .await;
    (code, buffer.events())
}

/// Every line parses as JSON, the last line is the only terminal event.
fn assert_stream_wellformed(events: &[serde_json::Value]) {
    assert!(!events.is_empty());
    let terminal_count = events
        .iter()
        .filter(|e| e["type"] == "complete" || e["type"] == "error")
        .count();
    assert_eq!(terminal_count, 1, "exactly one terminal event expected");
    let last = events.last().unwrap();
    assert!(
        last["type"] == "complete" || last["type"] == "error",
        "terminal event must be the last line: {last}"
    );
}

fn progress_values(events: &[serde_json::Value]) -> Vec<u64> {
    events
        .iter()
        .filter(|e| e["type"] == "progress")
        .map(|e| e["progress"].as_u64().unwrap())
        .collect()
}

fn active_service() -> CommandOutput {
    ok_with("active\n")
}

#[tokio::test]
async fn scenario_a_empty_models_runtime_present_completes() {
    let port = spawn_health_endpoint().await;
    let config = DeployConfig {
        models: vec![],
        port,
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .on("uname", ok_with("Linux 6.1.0"))
            .on("ollama --version", ok_with("ollama version 0.5.7"))
            .on("is-active", active_service())
            .on("ollama list", ok_with("NAME\tID\tSIZE")),
    );

    let (code, events) = run_deploy(config, executor.clone()).await;

    assert_eq!(code, 0);
    assert_stream_wellformed(&events);

    let last = events.last().unwrap();
    assert_eq!(last["type"], "complete");
    assert_eq!(last["success"], true);
    // The original (empty-models) config is echoed back.
    assert_eq!(last["config"]["models"].as_array().unwrap().len(), 0);
    assert_eq!(last["config"]["port"], port);

    // No pull was ever attempted.
    assert!(executor.calls().iter().all(|c| !c.contains("pull")));
}

#[tokio::test]
async fn scenario_b_two_models_progress_band() {
    let port = spawn_health_endpoint().await;
    let config = DeployConfig {
        models: vec!["llama2:7b".to_string(), "mistral:7b".to_string()],
        port,
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .on("ollama --version", ok_with("ollama version 0.5.7"))
            .on("is-active", active_service()),
    );

    let (code, events) = run_deploy(config, executor.clone()).await;

    assert_eq!(code, 0);
    assert_stream_wellformed(&events);

    // Both pulls happened, in order.
    let pulls: Vec<String> = executor
        .calls()
        .into_iter()
        .filter(|c| c.contains("pull"))
        .collect();
    assert_eq!(pulls, vec!["ollama pull llama2:7b", "ollama pull mistral:7b"]);

    // Two per-model milestones inside the 60-90 band.
    let progress = progress_values(&events);
    let band: Vec<u64> = progress
        .iter()
        .copied()
        .filter(|p| *p > 60 && *p < 95)
        .collect();
    assert_eq!(band.len(), 2);
    assert!(band.iter().all(|p| (60..=90).contains(p)), "band: {band:?}");

    // Progress is non-decreasing and bounded across the whole run.
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "progress: {progress:?}");
    assert!(progress.iter().all(|p| *p <= 100));
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
}

#[tokio::test]
async fn first_failed_pull_aborts_without_attempting_rest() {
    let config = DeployConfig {
        models: vec!["llama2:7b".to_string(), "mistral:7b".to_string()],
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .on("ollama --version", ok_with("ollama version 0.5.7"))
            .on("is-active", active_service())
            .on("pull llama2:7b", fail(1, "pull failed: connection reset")),
    );

    let (code, events) = run_deploy(config, executor.clone()).await;

    assert_eq!(code, 1);
    assert_stream_wellformed(&events);

    let last = events.last().unwrap();
    assert_eq!(last["type"], "error");
    assert_eq!(last["success"], false);
    assert!(
        last["message"].as_str().unwrap().contains("model download"),
        "message: {}",
        last["message"]
    );

    // The second model was never attempted.
    assert!(executor.calls().iter().all(|c| !c.contains("mistral")));
}

#[tokio::test]
async fn installer_skips_when_runtime_present() {
    let port = spawn_health_endpoint().await;
    let config = DeployConfig {
        models: vec![],
        port,
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .on("ollama --version", ok_with("ollama version 0.5.7"))
            .on("is-active", active_service()),
    );

    let (code, _) = run_deploy(config, executor.clone()).await;

    assert_eq!(code, 0);
    assert!(
        executor.calls().iter().all(|c| !c.contains("install.sh")),
        "install script must not run when the runtime is present"
    );
}

#[tokio::test]
async fn installer_runs_vendor_script_when_runtime_missing() {
    let port = spawn_health_endpoint().await;
    let config = DeployConfig {
        models: vec![],
        port,
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            // First probe fails, post-install verification succeeds.
            .on_seq(
                "ollama --version",
                vec![fail(127, "ollama: not found"), ok_with("ollama version 0.5.7")],
            )
            .on("is-active", active_service()),
    );

    let (code, events) = run_deploy(config, executor.clone()).await;

    assert_eq!(code, 0);
    assert_stream_wellformed(&events);
    assert!(
        executor.calls().iter().any(|c| c.contains("install.sh")),
        "vendor install script expected: {:?}",
        executor.calls()
    );
}

#[tokio::test]
async fn scenario_e_service_never_active_fails_run() {
    let config = DeployConfig {
        models: vec![],
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .on("ollama --version", ok_with("ollama version 0.5.7"))
            .on("is-active", fail(3, "")),
    );

    let (code, events) = run_deploy(config, executor.clone()).await;

    assert_eq!(code, 1);
    assert_stream_wellformed(&events);

    let last = events.last().unwrap();
    assert_eq!(last["type"], "error");
    assert!(
        last["message"].as_str().unwrap().contains("service start"),
        "error must identify the service-start stage: {}",
        last["message"]
    );

    // Artifacts created before the failure are reported, before the
    // terminal event.
    let left_behind: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            e["type"] == "log"
                && e["message"]
                    .as_str()
                    .map(|m| m.contains("Left in place"))
                    .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect();
    assert!(!left_behind.is_empty(), "left-behind artifacts not reported");
    assert!(left_behind.iter().all(|i| *i < events.len() - 1));
}

#[tokio::test]
async fn missing_curl_triggers_one_install_attempt() {
    let port = spawn_health_endpoint().await;
    let config = DeployConfig {
        models: vec![],
        port,
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .on_seq(
                "curl --version",
                vec![fail(127, "curl: not found"), ok_with("curl 8.5.0")],
            )
            .on("ollama --version", ok_with("ollama version 0.5.7"))
            .on("is-active", active_service()),
    );

    let (code, _) = run_deploy(config, executor.clone()).await;

    assert_eq!(code, 0);
    let installs: Vec<String> = executor
        .calls()
        .into_iter()
        .filter(|c| c.contains("apt-get install"))
        .collect();
    assert_eq!(installs.len(), 1);
}

#[tokio::test]
async fn failed_curl_install_aborts_at_requirement_stage() {
    let config = DeployConfig {
        models: vec![],
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .on("curl --version", fail(127, "curl: not found"))
            .on("apt-get", fail(100, "E: Unable to locate package curl")),
    );

    let (code, events) = run_deploy(config, executor.clone()).await;

    assert_eq!(code, 1);
    assert_stream_wellformed(&events);

    let last = events.last().unwrap();
    assert_eq!(last["type"], "error");
    assert!(
        last["message"].as_str().unwrap().contains("requirement check"),
        "message: {}",
        last["message"]
    );
    // Nothing past the requirement stage ran.
    assert!(executor.calls().iter().all(|c| !c.contains("systemctl start")));
}

#[tokio::test]
async fn every_command_is_logged_before_its_result() {
    let port = spawn_health_endpoint().await;
    let config = DeployConfig {
        models: vec!["llama2:7b".to_string()],
        port,
        ..DeployConfig::default()
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .on("ollama --version", ok_with("ollama version 0.5.7"))
            .on("is-active", active_service()),
    );

    let (code, events) = run_deploy(config, executor.clone()).await;
    assert_eq!(code, 0);

    // Each recorded invocation appears as an info log on the stream.
    let logged: Vec<&str> = events
        .iter()
        .filter(|e| e["type"] == "log")
        .filter_map(|e| e["message"].as_str())
        .collect();
    for call in executor.calls() {
        assert!(
            logged
                .iter()
                .any(|m| m.starts_with("Running command: ") && m.contains(&call)),
            "call not logged: {call}"
        );
    }
}
