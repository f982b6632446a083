//! ProcessSupervisor - runs at most one application process at a time.
//!
//! Start spawns with inherited stdin/stdout and a forwarded stderr, then
//! probes briefly so a process that dies on startup is reported as
//! `StartOutcome::Failed`. Stop asks the process to terminate and waits for
//! it to exit, falling back to a forced kill after the grace period.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::process::{Child, Command};
use tokio::time::Instant;

use super::handle::ProcessHandle;
use super::tail::StderrTail;
use super::{LaunchSpec, PORT_ENV, ProcessControl, ProcessStatus, StartOutcome, SupervisorConfig, TOOLS_PATH_ENV};
use crate::error::{DevError, Result};

/// How long to wait for stderr to drain after an early exit
const STDERR_DRAIN: Duration = Duration::from_millis(200);

/// Supervisor owning the single process slot of a session
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    handle: ProcessHandle,
    launches: u64,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            handle: ProcessHandle::stopped(),
            launches: 0,
        }
    }

    /// The current process slot
    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    /// Number of successful spawns over the supervisor's lifetime
    pub fn launches(&self) -> u64 {
        self.launches
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .env(PORT_ENV, spec.port.to_string());

        match &spec.tools_path {
            Some(tools_path) => {
                cmd.env(TOOLS_PATH_ENV, tools_path);
            }
            None => {
                cmd.env_remove(TOOLS_PATH_ENV);
            }
        }

        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Signal the tracked process once; returns the end of its grace window.
    ///
    /// A stop resumed after cancellation reuses the recorded deadline.
    fn request_stop(&mut self) -> Instant {
        if let Some(termination) = self.handle.termination() {
            debug!("Termination already requested, resuming wait");
            return termination.deadline;
        }

        if let Some(child) = self.handle.child_mut()
            && let Err(e) = request_termination(child)
        {
            warn!("Failed to request termination: {}", e);
        }
        let deadline = Instant::now() + self.config.grace_period();
        self.handle.begin_termination(deadline);
        deadline
    }

    /// Wait for exit until `deadline`, then kill once and wait `kill_timeout`
    async fn await_exit(&mut self, deadline: Instant) {
        let killed = self.handle.termination().is_some_and(|t| t.killed);
        if !killed {
            let Some(child) = self.handle.child_mut() else {
                return;
            };
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("Server exited: {}", status);
                    return;
                }
                Ok(Err(e)) => {
                    warn!("Failed waiting for server exit: {}", e);
                    return;
                }
                Err(_) => {
                    warn!("Server did not exit within {:?}, killing", self.config.grace_period());
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill server: {}", e);
                    }
                }
            }
            self.handle.mark_killed();
        }

        let kill_timeout = self.config.kill_timeout();
        if let Some(child) = self.handle.child_mut()
            && tokio::time::timeout(kill_timeout, child.wait()).await.is_err()
        {
            warn!("Server still not reaped after {:?}, releasing slot", kill_timeout);
        }
    }

    /// Wait for the startup probe; `Some(detail)` if the process died within it
    async fn probe(&self, child: &mut Child) -> Option<String> {
        let probe = self.config.startup_probe();
        let waited = if probe.is_zero() {
            child.try_wait().map(|s| s.map(|status| status.to_string()))
        } else {
            match tokio::time::timeout(probe, child.wait()).await {
                Ok(result) => result.map(|status| Some(status.to_string())),
                Err(_) => Ok(None),
            }
        };

        match waited {
            Ok(Some(status)) => Some(format!("exited with {}", status)),
            Ok(None) => None,
            Err(e) => Some(format!("failed to observe process: {}", e)),
        }
    }
}

#[async_trait]
impl ProcessControl for ProcessSupervisor {
    async fn start(&mut self, spec: &LaunchSpec) -> Result<StartOutcome> {
        if self.handle.is_tracked() {
            warn!("Start requested while a process is tracked, stopping it first");
            self.stop().await;
        }

        self.handle = ProcessHandle::starting();
        debug!("Spawning '{}' in {}", spec.command_line(), spec.working_dir.display());

        let mut child = match self.command(spec).spawn() {
            Ok(child) => child,
            Err(source) => {
                self.handle = ProcessHandle::failed(source.to_string());
                return Err(DevError::Spawn {
                    program: spec.program.clone(),
                    source,
                });
            }
        };

        let mut tail = child
            .stderr
            .take()
            .map(|stderr| StderrTail::capture(stderr, self.config.stderr_tail_lines));

        if let Some(detail) = self.probe(&mut child).await {
            let stderr = match tail.as_mut() {
                Some(tail) => {
                    tail.finish(STDERR_DRAIN).await;
                    Some(tail.snapshot()).filter(|s| !s.is_empty())
                }
                None => None,
            };
            warn!("Server failed to start: {}", detail);
            self.handle = ProcessHandle::failed(detail.clone());
            return Ok(StartOutcome::Failed { detail, stderr });
        }

        let pid = child.id();
        self.handle = ProcessHandle::running(child, tail);
        self.launches += 1;
        info!("Server started (pid {:?}, port {})", pid, spec.port);
        Ok(StartOutcome::Running { pid })
    }

    async fn stop(&mut self) -> bool {
        if !self.handle.is_tracked() {
            self.handle = ProcessHandle::stopped();
            return false;
        }

        let deadline = self.request_stop();
        self.await_exit(deadline).await;

        match self.handle.started_at() {
            Some(started) => info!(
                "Server stopped (pid {:?}, up {}s)",
                self.handle.pid(),
                (Utc::now() - started).num_seconds()
            ),
            None => info!("Server stopped"),
        }
        self.handle = ProcessHandle::stopped();
        true
    }

    fn status(&self) -> ProcessStatus {
        self.handle.status()
    }

    fn poll_exit(&mut self) -> Option<String> {
        let child = self.handle.child_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.handle.mark_exited(format!("exited with {}", status));
                self.handle.detail().map(str::to_string)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to poll server process: {}", e);
                None
            }
        }
    }
}

/// Ask the process to shut down gracefully
#[cfg(unix)]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        // already reaped
        return Ok(());
    };
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}
