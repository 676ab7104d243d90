//! Rig configuration
//!
//! JSON-backed settings for the whole rig. Every field has a default, so a
//! partial (or absent) file always yields a usable configuration.

use crate::merge::MergeOptions;
use crate::trigger::TriggerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level rig settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RigConfig {
    /// Directory session directories are created under
    pub output_dir: PathBuf,

    /// Default capture rate for sensors that don't override it
    pub frame_rate: u32,

    /// Proximity auto-recording thresholds
    pub trigger: TriggerConfig,

    /// Compositor tuning
    pub merge: MergeOptions,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            frame_rate: 30,
            trigger: TriggerConfig::default(),
            merge: MergeOptions::default(),
        }
    }
}

impl RigConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults; a present but malformed file is
    /// an error so typos don't silently fall back.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Persist the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = RigConfig::load(Path::new("/nonexistent/rig.json")).unwrap();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.output_dir, PathBuf::from("recordings"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rig.json");
        std::fs::write(
            &path,
            r#"{"outputDir": "/data/runs", "trigger": {"armThresholdMm": 40.0}}"#,
        )
        .unwrap();

        let config = RigConfig::load(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/data/runs"));
        assert_eq!(config.trigger.arm_threshold_mm, 40.0);
        // Untouched fields keep their defaults
        assert_eq!(config.trigger.disarm_threshold_mm, 150.0);
        assert_eq!(config.merge.target_cell_height, 720);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rig.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            RigConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/rig.json");

        let mut config = RigConfig::default();
        config.frame_rate = 60;
        config.save(&path).unwrap();

        let reloaded = RigConfig::load(&path).unwrap();
        assert_eq!(reloaded.frame_rate, 60);
    }
}
