use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::compare::{CompareMethod, DEFAULT_IGNORES};

/// What `ScanSession::start` does while a scan is already running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    #[default]
    Reject,
    Restart,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompareConfig {
    #[serde(default)]
    pub left_root: Option<PathBuf>,
    #[serde(default)]
    pub right_root: Option<PathBuf>,
    #[serde(default)]
    pub include_unchanged: bool,
    #[serde(default = "default_auto_rescan")]
    pub auto_rescan: bool,
    #[serde(default)]
    pub compare_method: CompareMethod,
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub mtime_tolerance_secs: u64,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

fn default_auto_rescan() -> bool {
    true
}

fn default_ignore() -> Vec<String> {
    DEFAULT_IGNORES.iter().map(|name| name.to_string()).collect()
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            left_root: None,
            right_root: None,
            include_unchanged: false,
            auto_rescan: default_auto_rescan(),
            compare_method: CompareMethod::default(),
            ignore: default_ignore(),
            mtime_tolerance_secs: 0,
            restart_policy: RestartPolicy::default(),
        }
    }
}

impl CompareConfig {
    pub fn with_roots(left: impl Into<PathBuf>, right: impl Into<PathBuf>) -> Self {
        Self {
            left_root: Some(left.into()),
            right_root: Some(right.into()),
            ..Self::default()
        }
    }

    pub fn roots(&self) -> Option<(&Path, &Path)> {
        Some((self.left_root.as_deref()?, self.right_root.as_deref()?))
    }

    /// Reads a JSON configuration file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{CompareConfig, RestartPolicy};
    use crate::compare::CompareMethod;

    #[test]
    fn missing_file_loads_defaults() {
        let temp = TempDir::new().expect("tempdir");
        let config = CompareConfig::load(temp.path().join("absent.json")).expect("defaults");
        assert_eq!(config, CompareConfig::default());
        assert!(config.auto_rescan);
        assert!(config.ignore.contains(&".git".to_string()));
    }

    #[test]
    fn partial_document_fills_defaults() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{"left_root": "/data/left", "compare_method": "content", "restart_policy": "restart"}"#,
        )
        .expect("write config");

        let config = CompareConfig::load(&path).expect("parse");
        assert_eq!(config.compare_method, CompareMethod::Content);
        assert_eq!(config.restart_policy, RestartPolicy::Restart);
        assert!(config.right_root.is_none());
        assert!(config.roots().is_none());
        assert!(!config.include_unchanged);
    }

    #[test]
    fn save_creates_parent_directories() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("config.json");
        let config = CompareConfig::with_roots("/a", "/b");
        config.save(&path).expect("save");
        assert_eq!(CompareConfig::load(&path).expect("load"), config);
    }
}
