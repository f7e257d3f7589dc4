//! Line-delimited JSON event protocol.
//!
//! The orchestrator's only contract with its caller is stdout: one
//! self-contained JSON object per line, flushed as it happens so the
//! consuming parent sees events without buffering latency. A run emits any
//! number of progress/log events followed by exactly one terminal event
//! (`complete` or `error`); the emitter enforces that nothing follows the
//! terminal one.

use crate::config::DeployConfig;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Severity for log events on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One protocol event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeployEvent {
    /// A milestone in the deployment, 0-100.
    Progress {
        progress: u8,
        message: String,
        timestamp: f64,
    },
    /// An externally observable action (command run, command output,
    /// step outcome).
    Log {
        level: LogLevel,
        message: String,
        timestamp: f64,
    },
    /// Terminal success event, carries the resolved config for the
    /// caller's record. Always the last line of a successful run.
    Complete {
        success: bool,
        message: String,
        config: DeployConfig,
    },
    /// Terminal failure event. Always the last line of a failed run.
    Error {
        success: bool,
        message: String,
        timestamp: f64,
    },
}

impl DeployEvent {
    /// Terminal events end the stream for one run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployEvent::Complete { .. } | DeployEvent::Error { .. })
    }
}

/// Seconds since the Unix epoch, fractional.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Serializes events to the output sink, one JSON line each, flushed
/// immediately.
///
/// Interior mutability lets the emitter be shared by reference across the
/// sequential deployment steps; there is a single writer per run.
pub struct EventEmitter {
    out: Mutex<Box<dyn Write + Send>>,
    terminal_sent: AtomicBool,
}

impl EventEmitter {
    /// Emitter writing to the given sink.
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            terminal_sent: AtomicBool::new(false),
        }
    }

    /// Emitter writing the wire protocol to stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Emitter writing into a shared in-memory buffer, for tests and
    /// capture scenarios.
    pub fn buffered() -> (Self, EventBuffer) {
        let buffer = EventBuffer::default();
        (Self::new(Box::new(buffer.clone())), buffer)
    }

    /// Write one event as a single JSON line and flush.
    ///
    /// Events offered after the terminal one are dropped: the stream
    /// contract says nothing follows a `complete` or `error`.
    pub fn emit(&self, event: &DeployEvent) {
        if self.terminal_sent.load(Ordering::SeqCst) {
            warn!("event dropped after terminal event: {:?}", event);
            return;
        }
        if event.is_terminal() {
            self.terminal_sent.store(true, Ordering::SeqCst);
        }

        // Serialization of our own types cannot fail; a broken pipe means
        // the consuming parent is gone and there is nobody left to tell.
        let mut out = self.out.lock().expect("event sink poisoned");
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }

    /// Emit a progress milestone.
    pub fn progress(&self, progress: u8, message: impl Into<String>) {
        self.emit(&DeployEvent::Progress {
            progress: progress.min(100),
            message: message.into(),
            timestamp: unix_timestamp(),
        });
    }

    /// Emit a log event.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(&DeployEvent::Log {
            level,
            message: message.into(),
            timestamp: unix_timestamp(),
        });
    }

    /// Emit the terminal completion event.
    pub fn complete(&self, message: impl Into<String>, config: &DeployConfig) {
        self.emit(&DeployEvent::Complete {
            success: true,
            message: message.into(),
            config: config.clone(),
        });
    }

    /// Emit the terminal error event.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(&DeployEvent::Error {
            success: false,
            message: message.into(),
            timestamp: unix_timestamp(),
        });
    }
}

/// Shared in-memory event sink.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl EventBuffer {
    /// The captured stream as one string.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().expect("event buffer poisoned")).into_owned()
    }

    /// The captured stream split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(|l| l.to_string()).collect()
    }

    /// The captured stream parsed as JSON events.
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .map(|l| serde_json::from_str(l).expect("stream line is not valid JSON"))
            .collect()
    }
}

impl Write for EventBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().expect("event buffer poisoned").write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_single_json_lines() {
        let (emitter, buffer) = EventEmitter::buffered();
        emitter.progress(5, "Checking system requirements");
        emitter.log(LogLevel::Info, "curl available");

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("type").is_some());
        }
    }

    #[test]
    fn test_progress_event_shape() {
        let (emitter, buffer) = EventEmitter::buffered();
        emitter.progress(60, "Downloading models");

        let event = &buffer.events()[0];
        assert_eq!(event["type"], "progress");
        assert_eq!(event["progress"], 60);
        assert_eq!(event["message"], "Downloading models");
        assert!(event["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_log_levels_serialize_lowercase() {
        let (emitter, buffer) = EventEmitter::buffered();
        emitter.log(LogLevel::Warn, "STDERR: something");

        let event = &buffer.events()[0];
        assert_eq!(event["type"], "log");
        assert_eq!(event["level"], "warn");
    }

    #[test]
    fn test_nothing_follows_terminal_event() {
        let (emitter, buffer) = EventEmitter::buffered();
        emitter.error("Service start failed");
        emitter.log(LogLevel::Info, "should be dropped");
        emitter.complete("should also be dropped", &DeployConfig::default());

        let events = buffer.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "error");
        assert_eq!(events[0]["success"], false);
    }

    #[test]
    fn test_complete_echoes_config() {
        let (emitter, buffer) = EventEmitter::buffered();
        let config = DeployConfig {
            models: vec![],
            ..DeployConfig::default()
        };
        emitter.complete("LLM server deployed successfully", &config);

        let event = &buffer.events()[0];
        assert_eq!(event["type"], "complete");
        assert_eq!(event["success"], true);
        assert_eq!(event["config"]["port"], 11434);
        assert_eq!(event["config"]["models"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_progress_clamped_to_100() {
        let (emitter, buffer) = EventEmitter::buffered();
        emitter.progress(250, "overflow");
        assert_eq!(buffer.events()[0]["progress"], 100);
    }
}
