//! Process supervision
//!
//! Owns the lifecycle of the single application process of a dev session:
//! - `LaunchSpec`: what to run and with which environment
//! - `ProcessHandle`: the one tracked process slot
//! - `ProcessSupervisor`: start, stop (bounded wait-for-exit), restart
//! - `ProcessControl`: the seam the orchestrator drives

mod handle;
mod process;
mod tail;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use handle::ProcessHandle;
pub use process::ProcessSupervisor;
pub use tail::StderrTail;

/// Environment variable carrying the listen port
pub const PORT_ENV: &str = "PORT";

/// Environment variable carrying the comma-joined tool bundle paths
pub const TOOLS_PATH_ENV: &str = "TOOLS_PATH";

/// Lifecycle state of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Stopped,
    Starting,
    Running,
    Failed,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of an expected-path start attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Process launched and survived the startup probe
    Running { pid: Option<u32> },
    /// Process exited during the startup probe
    Failed {
        detail: String,
        /// Captured stderr tail, if the process wrote any
        stderr: Option<String>,
    },
}

impl StartOutcome {
    pub fn is_running(&self) -> bool {
        matches!(self, StartOutcome::Running { .. })
    }

    /// One-line failure summary including diagnostics, `None` when running
    pub fn failure_message(&self) -> Option<String> {
        match self {
            StartOutcome::Running { .. } => None,
            StartOutcome::Failed { detail, stderr: None } => Some(detail.clone()),
            StartOutcome::Failed {
                detail,
                stderr: Some(stderr),
            } => Some(format!("{}\nstderr: {}", detail, stderr)),
        }
    }
}

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub port: u16,
    /// `TOOLS_PATH` value; the variable is removed from the child env when absent
    pub tools_path: Option<String>,
    /// Additional environment variables
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            port,
            tools_path: None,
            env: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the tools path
    pub fn tools_path(mut self, tools_path: Option<String>) -> Self {
        self.tools_path = tools_path;
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Display form for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Timing and capture settings for the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long a terminated process may take to exit before it is killed
    pub grace_period_ms: u64,
    /// Bound on waiting for a killed process to be reaped
    pub kill_timeout_ms: u64,
    /// How long a fresh process must stay alive to count as launched
    pub startup_probe_ms: u64,
    /// Stderr lines kept for failure diagnostics
    pub stderr_tail_lines: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1000,
            kill_timeout_ms: 2000,
            startup_probe_ms: 250,
            stderr_tail_lines: 50,
        }
    }
}

impl SupervisorConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn startup_probe(&self) -> Duration {
        Duration::from_millis(self.startup_probe_ms)
    }
}

/// Control surface over the single supervised process
#[async_trait]
pub trait ProcessControl: Send {
    /// Launch a process into the slot.
    ///
    /// `Ok(StartOutcome::Failed)` for a process that dies on startup,
    /// `Err` for OS-level spawn faults.
    async fn start(&mut self, spec: &LaunchSpec) -> Result<StartOutcome>;

    /// Terminate the tracked process, if any. Returns whether one was stopped.
    ///
    /// Cancel-safe: a stop dropped mid-wait is resumed by the next call
    /// without signalling the process again.
    async fn stop(&mut self) -> bool;

    /// Current slot status
    fn status(&self) -> ProcessStatus;

    /// Notice a process that exited on its own since the last call.
    ///
    /// Returns the exit detail once per exit.
    fn poll_exit(&mut self) -> Option<String> {
        None
    }

    /// Stop, then start. Never overlaps two processes.
    async fn restart(&mut self, spec: &LaunchSpec) -> Result<StartOutcome> {
        self.stop().await;
        self.start(spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_spec_builder() {
        let spec = LaunchSpec::new("node", "/work", 4111)
            .arg("server.mjs")
            .tools_path(Some("/work/tools/a.mjs".to_string()))
            .env("NODE_ENV", "development");
        assert_eq!(spec.command_line(), "node server.mjs");
        assert_eq!(spec.port, 4111);
        assert_eq!(spec.tools_path.as_deref(), Some("/work/tools/a.mjs"));
        assert_eq!(spec.env, vec![("NODE_ENV".to_string(), "development".to_string())]);
    }

    #[test]
    fn test_supervisor_config_default() {
        let config = SupervisorConfig::default();
        assert_eq!(config.grace_period(), Duration::from_secs(1));
        assert_eq!(config.kill_timeout(), Duration::from_secs(2));
        assert_eq!(config.startup_probe(), Duration::from_millis(250));
        assert_eq!(config.stderr_tail_lines, 50);
    }

    #[test]
    fn test_start_outcome_failure_message() {
        let running = StartOutcome::Running { pid: Some(1) };
        assert!(running.is_running());
        assert!(running.failure_message().is_none());

        let failed = StartOutcome::Failed {
            detail: "exited with exit status: 1".to_string(),
            stderr: Some("Error: EADDRINUSE".to_string()),
        };
        assert!(!failed.is_running());
        let msg = failed.failure_message().unwrap();
        assert!(msg.contains("exit status: 1"));
        assert!(msg.contains("EADDRINUSE"));
    }

    #[test]
    fn test_process_status_display() {
        assert_eq!(ProcessStatus::Running.to_string(), "running");
        assert_eq!(ProcessStatus::Failed.to_string(), "failed");
    }
}
