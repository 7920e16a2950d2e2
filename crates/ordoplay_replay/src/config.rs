// SPDX-License-Identifier: MIT OR Apache-2.0
//! Replay engine configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Replay config file name looked up next to a project
pub const CONFIG_FILE_NAME: &str = "replay.ron";

/// What a player does when more than one clip contains the playhead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverlapPolicy {
    /// Honor the earliest clip and log a warning
    #[default]
    FirstWins,
    /// Refuse to drive and report an error
    Reject,
}

/// Settings shared by every player of an orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Policy for overlapping clips on one sequence
    pub overlap_policy: OverlapPolicy,
    /// Log every drive decision at debug level
    pub trace_drives: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            overlap_policy: OverlapPolicy::FirstWins,
            trace_drives: false,
        }
    }
}

impl ReplayConfig {
    /// Parse a config from RON text
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron_str(&text)?;
        tracing::info!("Loaded replay config from {}", path.display());
        Ok(config)
    }

    /// Load `replay.ron` from `dir`, falling back to defaults if it does not exist
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReplayConfig::default();
        assert_eq!(config.overlap_policy, OverlapPolicy::FirstWins);
        assert!(!config.trace_drives);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = ReplayConfig::from_ron_str("(overlap_policy: Reject)").unwrap();
        assert_eq!(config.overlap_policy, OverlapPolicy::Reject);
        assert!(!config.trace_drives);
    }

    #[test]
    fn test_serialization() {
        let config = ReplayConfig {
            overlap_policy: OverlapPolicy::Reject,
            trace_drives: true,
        };
        let ron_str = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        assert_eq!(ReplayConfig::from_ron_str(&ron_str).unwrap(), config);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ReplayConfig::from_ron_str("(overlap_policy: Sometimes)"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = std::env::temp_dir().join(format!("ordoplay_replay_{}", uuid::Uuid::new_v4()));
        let config = ReplayConfig::load_or_default(&dir).unwrap();
        assert_eq!(config, ReplayConfig::default());
    }
}
