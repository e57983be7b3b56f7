use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::record::DEFAULT_SEGMENT_COUNT;

/// Engine configuration loaded from `~/.config/segdl/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of downloads running at once (scheduler permits).
    pub max_running_downloads: usize,
    /// Minimum free bytes required at the destination before a download starts.
    pub min_usable_storage_bytes: u64,
    /// Segment count for requests that do not choose one.
    pub default_segment_count: usize,
    pub connect_timeout_secs: u64,
    /// Abort a transfer when throughput stays below this many bytes/s ...
    pub low_speed_limit_bytes: u32,
    /// ... for this many seconds.
    pub low_speed_time_secs: u64,
    /// Dedicated executors. Downloads whose tag matches one run under its
    /// limit instead of `max_running_downloads`.
    pub executors: Vec<ExecutorConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub name: String,
    pub tag: String,
    pub max_running_downloads: usize,
}

impl ExecutorConfig {
    pub fn new(name: impl Into<String>, tag: impl Into<String>, max_running_downloads: usize) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            max_running_downloads,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_running_downloads: 3,
            min_usable_storage_bytes: 4096,
            default_segment_count: DEFAULT_SEGMENT_COUNT,
            connect_timeout_secs: 30,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
            executors: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Permit count actually used: at least one.
    pub fn permits(&self) -> usize {
        self.max_running_downloads.max(1)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("segdl")?;
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

    let data = fs::read_to_string(&path)?;
    let cfg: EngineConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_running_downloads, 3);
        assert_eq!(cfg.min_usable_storage_bytes, 4096);
        assert_eq!(cfg.default_segment_count, 3);
        assert_eq!(cfg.connect_timeout_secs, 30);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_partial_uses_defaults() {
        let toml = r#"
            max_running_downloads = 8
            low_speed_time_secs = 120
        "#;
        let cfg: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_running_downloads, 8);
        assert_eq!(cfg.low_speed_time_secs, 120);
        assert_eq!(cfg.min_usable_storage_bytes, 4096);
        assert_eq!(cfg.default_segment_count, 3);
    }

    #[test]
    fn config_toml_executor_tables() {
        let toml = r#"
            max_running_downloads = 4

            [[executors]]
            name = "music"
            tag = "music"
            max_running_downloads = 1
        "#;
        let cfg: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.executors, vec![ExecutorConfig::new("music", "music", 1)]);

        let written = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn zero_permits_clamped() {
        let cfg = EngineConfig {
            max_running_downloads: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.permits(), 1);
    }
}
