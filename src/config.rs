//! Configuration management for archivist
//!
//! Values come from built-in defaults, an optional TOML file, `ARCHIVIST_*`
//! environment variables and finally command line flags, in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::core::filter::{normalize_extension, DEFAULT_EXTENSIONS, DEFAULT_NOISE_DIRS};
use crate::error::{ArchivistError, Result};

/// Global configuration for archivist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivistConfig {
    /// What to watch and how much history to keep in memory
    pub monitor: MonitorConfig,
    /// Change log location and retention
    pub log: LogConfig,
    /// Summary file location and refresh cadence
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Watched folders; the first one is the primary folder
    pub folders: Vec<PathBuf>,
    /// Tracked extensions, each starting with a dot
    pub extensions: Vec<String>,
    /// Directory names never descended into
    pub noise_dirs: Vec<String>,
    /// Change records kept for display
    pub max_recent_records: usize,
    /// Diagnostics kept for display
    pub max_diagnostics: usize,
    /// Also write start/stop and command events to the change log
    pub record_session_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    /// Default retention for `log prune`
    pub retain_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub path: PathBuf,
    /// Regenerate the summary this often while monitoring, if anything changed
    pub refresh_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            folders: vec![PathBuf::from(".")],
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            noise_dirs: DEFAULT_NOISE_DIRS.iter().map(|d| d.to_string()).collect(),
            max_recent_records: 1000,
            max_diagnostics: 200,
            record_session_events: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("docs/changelog"),
            retain_days: 30,
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("docs/project_state.md"),
            refresh_interval_secs: 30,
        }
    }
}

impl SummaryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Split a comma separated extension list, dropping empty items.
pub fn parse_extension_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

impl ArchivistConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|err| ArchivistError::Config {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    }

    /// Load from `path` if given and present, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::debug!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Override values from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("ARCHIVIST_LOG_DIR") {
            self.log.log_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ARCHIVIST_SUMMARY_FILE") {
            self.summary.path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ARCHIVIST_EXTENSIONS") {
            let list = parse_extension_list(&val);
            if !list.is_empty() {
                self.monitor.extensions = list;
            }
        }

        if let Ok(val) = std::env::var("ARCHIVIST_REFRESH_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.summary.refresh_interval_secs = secs;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.monitor.folders.is_empty() {
            return Err("at least one folder must be configured".to_string());
        }

        if self.monitor.extensions.is_empty() {
            return Err("at least one extension must be tracked".to_string());
        }

        for ext in &self.monitor.extensions {
            normalize_extension(ext).map_err(|err| err.to_string())?;
        }

        if self.monitor.max_recent_records == 0 || self.monitor.max_diagnostics == 0 {
            return Err("max_recent_records and max_diagnostics must be greater than 0".to_string());
        }

        if self.summary.refresh_interval_secs == 0 {
            return Err("refresh_interval_secs must be greater than 0".to_string());
        }

        Ok(())
    }
}
