//! Persistent configuration for kubelink.
//!
//! Loads/saves a TOML config at `~/.kubelink/config.toml`.

use crate::KubelinkError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level kubelink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubelinkConfig {
    pub scan: ScanConfig,
    pub resolver: ResolverConfig,
    pub watch: WatchConfig,
}

impl KubelinkConfig {
    /// Load configuration from the given path.
    pub fn load(path: &Path) -> Result<Self, KubelinkError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| KubelinkError::Config(e.to_string()))
    }

    /// Save configuration to the given path.
    pub fn save(&self, path: &Path) -> Result<(), KubelinkError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| KubelinkError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the default path, or return defaults if the file doesn't exist.
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Default config path: `~/.kubelink/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kubelink")
            .join("config.toml")
    }
}

/// Folder scanning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Glob patterns (matched against file names) of files to parse.
    pub file_includes: Vec<String>,
    /// Glob patterns (matched against relative paths and names) to mark excluded.
    pub scan_excludes: Vec<String>,
    /// Files larger than this are listed but not parsed.
    pub max_file_size_kb: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            file_includes: vec!["*.yaml".to_string(), "*.yml".to_string()],
            scan_excludes: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "**/pkg/mod/**".to_string(),
            ],
            max_file_size_kb: 1024,
        }
    }
}

/// Reference resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Namespace assumed for resources without `metadata.namespace`.
    pub default_namespace: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_namespace: "default".to_string(),
        }
    }
}

/// File watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window for file system events.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 50 }
    }
}
