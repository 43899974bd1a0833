use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default max chunk size: 1 MiB.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 1024 * 1024;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// libcurl timeouts for range GETs and HEAD probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurlConfig {
    pub connect_timeout_secs: u64,
    /// Abort when throughput stays below this many bytes/sec ...
    pub low_speed_limit: u32,
    /// ... for this many seconds.
    pub low_speed_time_secs: u64,
    /// Hard wall-clock limit per request.
    pub timeout_secs: u64,
}

impl Default for CurlConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            timeout_secs: 3600,
        }
    }
}

/// What happens to a task when one of its chunks fails permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Deregister the task, stop its remaining fetchers and drop the partial file.
    #[default]
    AbortTask,
    /// Let sibling chunks finish merging; the task is dropped once every chunk
    /// has either merged or failed.
    KeepSiblings,
}

/// Global configuration loaded from `~/.config/chunkdl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkdlConfig {
    /// Maximum bytes per chunk; a task gets ceil(length / this) chunks.
    pub max_segment_size: u64,
    /// Number of fetch worker threads shared by all tasks.
    pub workers: usize,
    /// Directory for chunk scratch files. Defaults to `<dest_dir>/.chunkdl`.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Optional retry policy; if missing, each chunk is attempted once.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub curl: CurlConfig,
}

impl Default for ChunkdlConfig {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            workers: 8,
            scratch_dir: None,
            failure_policy: FailurePolicy::AbortTask,
            retry: None,
            curl: CurlConfig::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("chunkdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ChunkdlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ChunkdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: ChunkdlConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
