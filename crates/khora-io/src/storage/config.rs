// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Storage settings, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Who runs queued escalations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DispatchMode {
    /// Waiting requests drain their stage's queue themselves before suspending.
    #[default]
    Inline,
    /// Requests only wait; queued work runs when [`Storage::pump`](super::Storage::pump) is called.
    External,
}

/// Settings of a [`Storage`](super::Storage).
///
/// # Examples
///
/// ```
/// use khora_io::storage::{DispatchMode, StorageConfig};
///
/// let config = StorageConfig::from_ron("(dispatch: External)").unwrap();
/// assert_eq!(config.dispatch, DispatchMode::External);
/// assert_eq!(config.reset_spin_limit, StorageConfig::default().reset_spin_limit);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Who runs queued escalations.
    pub dispatch: DispatchMode,
    /// How many times a bind spins on a resetting entry before yielding its thread.
    pub reset_spin_limit: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::Inline,
            reset_spin_limit: 64,
        }
    }
}

/// Errors that can occur while reading a [`StorageConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read storage config '{path}': {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The content is not a valid RON `StorageConfig`.
    #[error("invalid storage config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

impl StorageConfig {
    /// Parses a config from RON text. Missing fields keep their defaults.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Reads and parses a RON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron(&text)?;
        log::debug!("Loaded storage config from {}: {:?}", path.display(), config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(StorageConfig::from_ron("()").unwrap(), StorageConfig::default());
    }

    #[test]
    fn test_full_config() {
        let config = StorageConfig::from_ron(
            r#"(
                dispatch: External,
                reset_spin_limit: 8,
            )"#,
        )
        .unwrap();
        assert_eq!(
            config,
            StorageConfig {
                dispatch: DispatchMode::External,
                reset_spin_limit: 8,
            }
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let error = StorageConfig::from_ron("(dispatch: Sometimes)").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_reports_the_path() {
        let error = StorageConfig::load("does/not/exist.ron").unwrap_err();
        assert!(error.to_string().contains("does/not/exist.ron"));
    }
}
