use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per request (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Negative or NaN base delays mean no delay; delays too large for a
    /// `Duration` are capped at `max_delay_secs`.
    pub fn policy(&self) -> RetryPolicy {
        let max_delay = Duration::from_secs(self.max_delay_secs);
        let base_delay = Duration::try_from_secs_f64(self.base_delay_secs.max(0.0))
            .unwrap_or(max_delay)
            .min(max_delay);
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }
}

/// Engine configuration loaded from `~/.config/grab/config.toml`.
///
/// Fixed for the lifetime of a [`crate::manager::DownloadManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of worker threads draining the job queue.
    pub workers: usize,
    /// Size of the transport pool (concurrent HTTP connections across all tasks).
    pub max_connections: usize,
    /// Connect timeout per request, in seconds.
    pub connect_timeout_secs: u64,
    /// Hard wall-clock cap per request, in seconds.
    pub timeout_secs: u64,
    /// Abort a transfer that stays under 1 KiB/s for this many seconds.
    pub stall_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Base directory for task output (None = current directory).
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// User-Agent sent with every request unless the caller overrides it.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Extra headers merged under caller-supplied headers.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_connections: 8,
            connect_timeout_secs: 15,
            timeout_secs: 3600,
            stall_timeout_secs: 60,
            retry: None,
            output_dir: None,
            user_agent: None,
            default_headers: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().policy()
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("grab/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("grab")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<EngineConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
