//! Session inputs and output layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::ToolDiscovery;
use crate::watcher::WatchOptions;

/// Output directory name under the project root
pub const DEFAULT_WORK_DIR: &str = ".devloop";

/// Port used when none is requested
pub const DEFAULT_PORT: u16 = 4111;

/// Built-in server entry: serves the loaded tool names over HTTP
pub const DEFAULT_SERVER_TEMPLATE: &str = r#"import http from 'node:http';

const port = Number(process.env.PORT || 4111);
const toolPaths = (process.env.TOOLS_PATH || '').split(',').filter(Boolean);

const tools = {};
for (const toolPath of toolPaths) {
  Object.assign(tools, await import(toolPath));
}

http
  .createServer((req, res) => {
    res.setHeader('content-type', 'application/json');
    res.end(JSON.stringify({ tools: Object.keys(tools) }));
  })
  .listen(port, () => console.log(`Server listening on port ${port}`));
"#;

/// Everything a dev session needs, fixed at construction
#[derive(Debug, Clone)]
pub struct DevSession {
    /// Working directory of the session; env files live here
    pub project_dir: PathBuf,
    /// Main source tree, bundled and watched
    pub source_dir: PathBuf,
    /// Output root (`<work>/`)
    pub work_dir: PathBuf,
    pub port: u16,
    /// Seed for `.env` on first run
    pub initial_env: Option<(String, String)>,
    /// User-supplied tool directories, scanned before `<source>/tools`
    pub extra_tools_dirs: Vec<PathBuf>,
    /// Program that runs the server bundle
    pub runtime: String,
    pub server_template: String,
    /// Extension of every bundle
    pub extension: String,
    pub main_build_name: String,
    /// Window used to coalesce change bursts
    pub debounce: Duration,
    /// Extra watch ignore prefixes; the work dir is always ignored
    pub watch_ignore: Vec<PathBuf>,
}

impl DevSession {
    pub fn new(project_dir: impl Into<PathBuf>, source_dir: impl Into<PathBuf>, port: u16) -> Self {
        let project_dir = project_dir.into();
        Self {
            work_dir: project_dir.join(DEFAULT_WORK_DIR),
            source_dir: source_dir.into(),
            project_dir,
            port,
            initial_env: None,
            extra_tools_dirs: Vec::new(),
            runtime: "node".to_string(),
            server_template: DEFAULT_SERVER_TEMPLATE.to_string(),
            extension: "mjs".to_string(),
            main_build_name: "Mastra".to_string(),
            debounce: Duration::from_millis(100),
            watch_ignore: Vec::new(),
        }
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn initial_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.initial_env = Some((key.into(), value.into()));
        self
    }

    pub fn extra_tools_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.extra_tools_dirs = dirs;
        self
    }

    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn server_template(mut self, template: impl Into<String>) -> Self {
        self.server_template = template.into();
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    pub fn main_build_name(mut self, name: impl Into<String>) -> Self {
        self.main_build_name = name.into();
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn ignore(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.watch_ignore.push(prefix.into());
        self
    }

    /// `<source>/tools`
    pub fn default_tools_dir(&self) -> PathBuf {
        self.source_dir.join("tools")
    }

    /// `<work>/tools`
    pub fn tools_out_dir(&self) -> PathBuf {
        self.work_dir.join("tools")
    }

    /// `<work>/index.<ext>`
    pub fn server_entry_path(&self) -> PathBuf {
        self.work_dir.join(format!("index.{}", self.extension))
    }

    pub fn discovery(&self) -> ToolDiscovery {
        ToolDiscovery::new(self.default_tools_dir()).with_extra_dirs(self.extra_tools_dirs.iter().cloned())
    }

    pub fn watch_options(&self) -> WatchOptions {
        self.watch_ignore
            .iter()
            .fold(WatchOptions::default().ignore(&self.work_dir), |opts, p| opts.ignore(p))
    }

    pub fn initial_env_pair(&self) -> Option<(&str, &str)> {
        self.initial_env.as_ref().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}
