// Command bundler
// Runs an external build command for each bundle request

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::{BundleOptions, Bundler, resolve_entry};
use crate::error::{DevError, Result};

/// Default build command template
pub const DEFAULT_BUNDLE_COMMAND: &str =
    "npx --yes esbuild {entry} --bundle --platform=node --format=esm --outfile={outfile}";

/// Configuration for the command bundler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    /// Shell template; `{entry}`, `{outfile}`, `{source_dir}` and `{build_name}` are substituted
    pub command: String,
    /// Extension of every produced module
    pub extension: String,
    /// Timeout per invocation in milliseconds
    pub timeout_ms: u64,
    /// Build identifier of the main source tree
    pub main_build_name: String,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_BUNDLE_COMMAND.to_string(),
            extension: "mjs".to_string(),
            timeout_ms: 120_000,
            main_build_name: "Mastra".to_string(),
        }
    }
}

impl BundlerConfig {
    /// Create a config with the given command template
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Set the output extension
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    /// Set the timeout in milliseconds
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}

/// Bundler that runs a shell command per bundle
pub struct CommandBundler {
    config: BundlerConfig,
    out_dir: PathBuf,
    server_name: String,
}

impl CommandBundler {
    /// Create a bundler writing default outputs into `out_dir`
    pub fn new(config: BundlerConfig, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            out_dir: out_dir.into(),
            server_name: "server".to_string(),
        }
    }

    /// Base name of the server executable bundle
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    fn default_outfile(&self, build_name: &str) -> PathBuf {
        self.out_dir
            .join(format!("{}.{}", build_name.to_lowercase(), self.config.extension))
    }

    /// Substitute placeholders in the command template
    pub fn render(&self, entry: &Path, outfile: &Path, source_dir: &Path, build_name: &str) -> String {
        self.config
            .command
            .replace("{entry}", &shell_quote(&entry.display().to_string()))
            .replace("{outfile}", &shell_quote(&outfile.display().to_string()))
            .replace("{source_dir}", &shell_quote(&source_dir.display().to_string()))
            .replace("{build_name}", &shell_quote(build_name))
    }

    async fn run(&self, build_name: &str, command: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.out_dir).await?;

        debug!("Bundling '{}': {}", build_name, command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.out_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        let child = cmd.spawn()?;
        let group = GroupGuard::new(child.id());

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| DevError::Bundle {
                build_name: build_name.to_string(),
                message: format!("timed out after {}ms", self.config.timeout_ms),
            })??;
        group.release();

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut message = format!("exit code: {:?}", output.status.code());
            if !stderr.trim().is_empty() {
                message.push_str(&format!("\nstderr: {}", stderr.trim()));
            }
            Err(DevError::Bundle {
                build_name: build_name.to_string(),
                message,
            })
        }
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn bundle(&self, source_dir: &Path, options: &BundleOptions) -> Result<PathBuf> {
        let entry_name = options
            .entry_file
            .as_deref()
            .unwrap_or(crate::discovery::INDEX_BASE_NAME);
        let entry = resolve_entry(source_dir, entry_name).await?;
        let outfile = options
            .outfile
            .clone()
            .unwrap_or_else(|| self.default_outfile(&options.build_name));

        if let Some(parent) = outfile.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let command = self.render(&entry, &outfile, source_dir, &options.build_name);
        self.run(&options.build_name, &command).await?;
        info!("Bundled '{}' -> {}", options.build_name, outfile.display());
        Ok(outfile)
    }

    async fn bundle_server(&self, entry_path: &Path) -> Result<PathBuf> {
        let outfile = self.default_outfile(&self.server_name);
        let source_dir = entry_path.parent().unwrap_or(&self.out_dir);
        let command = self.render(entry_path, &outfile, source_dir, &self.server_name);
        self.run(&self.server_name, &command).await?;
        info!("Bundled server -> {}", outfile.display());
        Ok(outfile)
    }
}

/// Kills the bundle command's process group on drop unless released
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    /// The command finished; leave the group alone
    fn release(mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            // negative pid addresses the whole group
            let rc = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
            if rc != 0 {
                debug!("Bundle process group {} already gone", pgid);
            }
        }
        #[cfg(not(unix))]
        debug!("Bundle process {} dropped", pgid);
    }
}

/// Quote a value for `sh -c`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
