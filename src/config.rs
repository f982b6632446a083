use devloop::bundler::BundlerConfig;
use devloop::orchestrator::{DEFAULT_PORT, DEFAULT_SERVER_TEMPLATE, DEFAULT_WORK_DIR};
use devloop::supervisor::SupervisorConfig;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub work_dir: PathBuf,
    pub default_port: u16,
    pub bundler: BundlerConfig,
    pub server: ServerConfig,
    pub supervisor: SupervisorConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub runtime: String,
    pub entry_template: Option<PathBuf>,
    pub executable: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            runtime: "node".to_string(),
            entry_template: None,
            executable: "server".to_string(),
        }
    }
}

impl ServerConfig {
    /// Template content: the configured file, or the built-in entry
    pub fn template(&self) -> Result<String> {
        match &self.entry_template {
            Some(path) => fs::read_to_string(path)
                .context(format!("Failed to read server template {}", path.display())),
            None => Ok(DEFAULT_SERVER_TEMPLATE.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    pub ignore: Vec<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            ignore: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            default_port: DEFAULT_PORT,
            bundler: BundlerConfig::default(),
            server: ServerConfig::default(),
            supervisor: SupervisorConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
