//! DevOrchestrator - initial start, change-driven cycles, shutdown.
//!
//! The session runs on one task:
//! 1. Build the main tree, every discovered tool and the server entry
//! 2. Start the server; failure here ends the session
//! 3. Watch the source tree; each burst of changes runs one rebuild and restart
//! 4. On shutdown stop the server, then close the watcher

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use colored::*;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use super::gate::CycleGate;
use super::session::DevSession;
use crate::bootstrap;
use crate::bundler::{BundleOptions, Bundler};
use crate::discovery::{DiscoveryWarning, ToolDescriptor, check_unique_names, tools_path_env};
use crate::error::{DevError, ErrorClass, Result};
use crate::supervisor::{LaunchSpec, ProcessControl, StartOutcome};
use crate::watcher::{ChangeEvent, ChangeSource, ChangeWatcher};

/// How often an idle session checks whether the server died
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Artifacts of one full build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Tools bundled, in discovery order
    pub tools: Vec<ToolDescriptor>,
    pub warnings: Vec<DiscoveryWarning>,
    /// Server bundle handed to the runtime
    pub executable: PathBuf,
    /// `TOOLS_PATH` for the server
    pub tools_path: Option<String>,
}

/// What a change-triggered cycle ended with
#[derive(Debug)]
pub enum CycleOutcome {
    Restarted { pid: Option<u32> },
    /// Rebuild failed; the previous server keeps running
    BuildFailed(DevError),
    /// Rebuild succeeded but the new server did not come up
    StartFailed(String),
}

impl CycleOutcome {
    pub fn is_restarted(&self) -> bool {
        matches!(self, CycleOutcome::Restarted { .. })
    }

    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            CycleOutcome::Restarted { .. } => None,
            CycleOutcome::BuildFailed(e) => Some(e.class()),
            CycleOutcome::StartFailed(_) => Some(ErrorClass::CycleFatal),
        }
    }
}

/// Keeps a running server in sync with its source tree
pub struct DevOrchestrator<B, P>
where
    B: Bundler,
    P: ProcessControl,
{
    session: DevSession,
    bundler: B,
    supervisor: P,
    gate: CycleGate,
}

impl<B, P> DevOrchestrator<B, P>
where
    B: Bundler,
    P: ProcessControl,
{
    pub fn new(session: DevSession, bundler: B, supervisor: P) -> Self {
        Self {
            session,
            bundler,
            supervisor,
            gate: CycleGate::new(),
        }
    }

    pub fn session(&self) -> &DevSession {
        &self.session
    }

    pub fn supervisor(&self) -> &P {
        &self.supervisor
    }

    pub fn gate(&self) -> &CycleGate {
        &self.gate
    }

    /// Seed and load the project env file
    fn bootstrap(&self) -> Result<()> {
        if let Some(path) = bootstrap::ensure_env_file(self.session.project_dir(), self.session.initial_env_pair())? {
            bootstrap::load_env(&path)?;
        }
        Ok(())
    }

    /// Bundle the main tree, every tool and the server entry, in that order
    pub async fn build(&self) -> Result<BuildOutput> {
        let session = &self.session;

        self.bundler
            .bundle(&session.source_dir, &BundleOptions::new(&session.main_build_name))
            .await?;

        let report = session.discovery().discover().await;
        check_unique_names(&report.tools)?;

        let tools_out = session.tools_out_dir();
        for tool in &report.tools {
            let options = BundleOptions::new(tool.logical_name())
                .outfile(tool.output_path(&tools_out, &session.extension))
                .entry_file(&tool.module_base_name);
            self.bundler.bundle(&tool.source_dir, &options).await?;
        }

        let entry = session.server_entry_path();
        tokio::fs::create_dir_all(&session.work_dir).await?;
        tokio::fs::write(&entry, &session.server_template).await?;
        let executable = self.bundler.bundle_server(&entry).await?;

        let tools_path = tools_path_env(&report.tools, &tools_out, &session.extension);
        debug!("Built {} tools, TOOLS_PATH={:?}", report.tools.len(), tools_path);

        Ok(BuildOutput {
            tools: report.tools,
            warnings: report.warnings,
            executable,
            tools_path,
        })
    }

    /// Launch spec for a finished build
    pub fn launch_spec(&self, build: &BuildOutput) -> LaunchSpec {
        LaunchSpec::new(&self.session.runtime, &self.session.work_dir, self.session.port)
            .arg(build.executable.display().to_string())
            .tools_path(build.tools_path.clone())
    }

    /// Initial build and start. Any failure here is session-fatal.
    pub async fn start(&mut self) -> Result<BuildOutput> {
        self.bootstrap()?;
        let build = self.build().await?;
        let spec = self.launch_spec(&build);

        println!("{}", "Starting server...".cyan());
        match self.supervisor.start(&spec).await {
            Ok(StartOutcome::Running { .. }) => Ok(build),
            Ok(failed) => {
                let message = failed.failure_message().unwrap_or_default();
                error!("Server failed to start: {}", message);
                Err(DevError::InitialStartFailed(message))
            }
            Err(e) => {
                error!("Server failed to start: {}", e);
                Err(DevError::InitialStartFailed(e.to_string()))
            }
        }
    }

    /// One rebuild followed by a restart
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let build = match self.build().await {
            Ok(build) => build,
            Err(e) => {
                error!("Rebuild failed: {}", e);
                return CycleOutcome::BuildFailed(e);
            }
        };

        let spec = self.launch_spec(&build);
        println!("{}", "Restarting server...".cyan());
        let failure = match self.supervisor.restart(&spec).await {
            Ok(StartOutcome::Running { pid }) => return CycleOutcome::Restarted { pid },
            Ok(failed) => failed.failure_message().unwrap_or_default(),
            Err(e) => e.to_string(),
        };

        error!("Server failed to restart: {}", failure);
        // release the failed slot
        self.supervisor.stop().await;
        CycleOutcome::StartFailed(failure)
    }

    /// Full session: start, watch `source_dir`, cycle on changes until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested during startup");
                println!("{}", "Stopping server...".yellow());
                self.supervisor.stop().await;
                return Ok(());
            }
            started = self.start() => {
                started?;
            }
        }

        let (watcher, events) = match ChangeWatcher::watch(&self.session.source_dir, self.session.watch_options()) {
            Ok(watching) => watching,
            Err(e) => {
                self.supervisor.stop().await;
                return Err(e);
            }
        };

        self.serve(watcher, events, shutdown).await
    }

    /// Cycle on events from `watcher` until `shutdown` resolves, then tear down.
    ///
    /// Expects the server to have been started already.
    pub async fn serve<W, F>(
        &mut self,
        mut watcher: W,
        mut events: mpsc::UnboundedReceiver<ChangeEvent>,
        shutdown: F,
    ) -> Result<()>
    where
        W: ChangeSource,
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut events_open = true;
        let mut exit_poll = tokio::time::interval(EXIT_POLL_INTERVAL);
        exit_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        'session: loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break 'session,
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        debug!("Change detected: {}", event.changed_path.display());
                        self.gate.request();
                    }
                    None => {
                        warn!("Change stream ended, waiting for shutdown");
                        events_open = false;
                    }
                },
                _ = exit_poll.tick() => {
                    if let Some(detail) = self.supervisor.poll_exit() {
                        error!("Server exited unexpectedly: {}", detail);
                        println!("{}", "Server exited, waiting for the next change".red());
                    }
                }
            }

            while self.gate.begin() {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break 'session,
                    _ = tokio::time::sleep(self.session.debounce) => {}
                }
                let absorbed = drain(&mut events);
                self.gate.absorb(absorbed);

                println!("{}", "Changes detected".cyan());
                let outcome = tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        info!("Shutdown requested during rebuild");
                        break 'session;
                    }
                    outcome = self.run_cycle() => outcome,
                };
                self.gate.finish();

                match &outcome {
                    CycleOutcome::Restarted { pid } => info!("Cycle {} complete (pid {:?})", self.gate.cycles(), pid),
                    CycleOutcome::BuildFailed(_) | CycleOutcome::StartFailed(_) => {
                        println!("{}", "Rebuild failed, waiting for the next change".red())
                    }
                }

                if drain(&mut events) > 0 {
                    self.gate.request();
                }
            }
        }

        self.shutdown(&mut watcher).await;
        Ok(())
    }

    async fn shutdown<W: ChangeSource>(&mut self, watcher: &mut W) {
        println!("{}", "Stopping server...".yellow());
        self.supervisor.stop().await;
        watcher.close();
        info!(
            "Session ended after {} cycles ({} changes coalesced)",
            self.gate.cycles(),
            self.gate.coalesced()
        );
    }
}

/// Discard queued events, returning how many there were
fn drain(events: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> usize {
    let mut count = 0;
    while events.try_recv().is_ok() {
        count += 1;
    }
    count
}
