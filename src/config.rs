//! Configuration management for collect-server

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_ENV: &str = "COLLECT_SERVER_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// OBS WebSocket configuration
    #[serde(default)]
    pub obs: ObsConfig,

    /// Dataset and video locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Recording orchestration configuration
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsConfig {
    /// OBS WebSocket host
    #[serde(default = "default_obs_host")]
    pub host: String,

    /// OBS WebSocket port
    #[serde(default = "default_obs_port")]
    pub port: u16,

    /// OBS WebSocket password (optional)
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root for per-subject session folders, relative to the config file
    #[serde(default = "default_dataset_root")]
    pub dataset_root: PathBuf,

    /// Directory OBS writes recordings into, relative to the config file
    #[serde(default = "default_video_output")]
    pub video_output: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Wait after stopping OBS before looking for the output file (ms)
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Container extensions considered recorder output
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    /// How repeated writes to the same sync marker are handled
    #[serde(default)]
    pub marker_policy: MarkerPolicy,
}

/// Write policy for sync marker slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPolicy {
    /// Later writes overwrite earlier ones
    #[default]
    LastWriteWins,
    /// The first write is kept, later writes are ignored
    FirstWriteWins,
}

/// Absolute, existing directories derived from [`PathsConfig`]
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub dataset_root: PathBuf,
    pub video_output: PathBuf,
}

// Default value functions
fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

fn default_obs_host() -> String {
    "localhost".to_string()
}

fn default_obs_port() -> u16 {
    4455
}

fn default_dataset_root() -> PathBuf {
    PathBuf::from("dataset")
}

fn default_video_output() -> PathBuf {
    PathBuf::from("videos")
}

fn default_stop_grace_ms() -> u64 {
    2000 // OBS finalizes the container asynchronously after StopRecord
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "mkv", "flv", "mov"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: default_obs_host(),
            port: default_obs_port(),
            password: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset_root: default_dataset_root(),
            video_output: default_video_output(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: default_stop_grace_ms(),
            video_extensions: default_video_extensions(),
            marker_policy: MarkerPolicy::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            obs: ObsConfig::default(),
            paths: PathsConfig::default(),
            recording: RecordingConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from `explicit`, `$COLLECT_SERVER_CONFIG`, or the default location.
    /// A missing file is created with default values.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path,
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => PathBuf::from(path),
                None => Self::default_config_path()?,
            },
        };

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file, writing defaults if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path.to_path_buf());
            Ok(config)
        } else {
            let config = Config {
                config_path: Some(config_path.to_path_buf()),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Directory that relative paths are resolved against
    pub fn base_dir(&self) -> Result<PathBuf> {
        let config_path = self.config_path()?;
        let base = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir().context("Failed to determine working directory")?,
        };
        Ok(base)
    }

    /// Resolve dataset and video directories against the base dir and create them
    pub fn resolve_paths(&self) -> Result<ResolvedPaths> {
        let base = self.base_dir()?;
        let dataset_root = ensure_dir(base.join(&self.paths.dataset_root))?;
        let video_output = ensure_dir(base.join(&self.paths.video_output))?;

        Ok(ResolvedPaths {
            dataset_root,
            video_output,
        })
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "crowd-cast", "collect-server")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory: {:?}", path))?;
    path.canonicalize()
        .with_context(|| format!("Failed to resolve directory: {:?}", path))
}
