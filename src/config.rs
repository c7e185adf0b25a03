// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine location and probe bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,

    /// Bound on each `-formats`/`-codecs`/`-encoders`/`-hwaccels` query
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,

    #[serde(default = "default_software_probe_timeout")]
    pub software_probe_timeout_secs: u64,

    /// Hardware probes get longer; driver and session setup is slow
    #[serde(default = "default_hardware_probe_timeout")]
    pub hardware_probe_timeout_secs: u64,

    #[serde(default = "default_copy_trial_timeout")]
    pub copy_trial_timeout_secs: u64,

    /// Length of input re-muxed by the stream-copy trial
    #[serde(default = "default_copy_trial_seconds")]
    pub copy_trial_seconds: f64,

    #[serde(default = "default_file_info_timeout")]
    pub file_info_timeout_secs: u64,

    /// VA-API render node; detected under /dev/dri when unset
    #[serde(default)]
    pub vaapi_device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Upper bound on (video, audio) combinations tried per file
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Output lines kept from a failed attempt for the error report
    #[serde(default = "default_tail_lines")]
    pub diagnostic_tail_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Default number of concurrent conversions
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by MUXOLOTL_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_discovery_timeout() -> u64 {
    5
}

fn default_software_probe_timeout() -> u64 {
    10
}

fn default_hardware_probe_timeout() -> u64 {
    20
}

fn default_copy_trial_timeout() -> u64 {
    5
}

fn default_copy_trial_seconds() -> f64 {
    0.5
}

fn default_file_info_timeout() -> u64 {
    10
}

fn default_max_attempts() -> usize {
    12
}

fn default_tail_lines() -> usize {
    20
}

fn default_max_workers() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            discovery_timeout_secs: default_discovery_timeout(),
            software_probe_timeout_secs: default_software_probe_timeout(),
            hardware_probe_timeout_secs: default_hardware_probe_timeout(),
            copy_trial_timeout_secs: default_copy_trial_timeout(),
            copy_trial_seconds: default_copy_trial_seconds(),
            file_info_timeout_secs: default_file_info_timeout(),
            vaapi_device: None,
        }
    }
}

impl EngineConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn software_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.software_probe_timeout_secs)
    }

    pub fn hardware_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.hardware_probe_timeout_secs)
    }

    pub fn copy_trial_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_trial_timeout_secs)
    }

    pub fn file_info_timeout(&self) -> Duration {
        Duration::from_secs(self.file_info_timeout_secs)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            diagnostic_tail_lines: default_tail_lines(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("muxolotl")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("muxolotl")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the default location; built-in defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<PathBuf> {
        let path = Self::config_path()?;
        if !path.exists() {
            Config::default().save_to(&path)?;
        }
        Ok(path)
    }
}
