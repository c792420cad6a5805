use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// `DataVersion` thresholds at which the chunk layout changes.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VersionConfig {
    /// First version storing sections as palette + index array instead of numeric ids.
    pub flattening: i32,
    /// First version where packed indices no longer span two words.
    pub unstretched_block_states: i32,
    /// First version without the `Level` wrapper compound.
    pub level_removed: i32,
    /// Newer chunks are rejected. `None` accepts everything.
    pub max_data_version: Option<i32>,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            flattening: 1451,
            unstretched_block_states: 2529,
            level_removed: 2844,
            max_data_version: None,
        }
    }
}

impl VersionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flattening < 0
            || self.flattening > self.unstretched_block_states
            || self.unstretched_block_states > self.level_removed
        {
            return Err(ConfigError::Invalid(format!(
                "versions must satisfy 0 <= flattening ({}) <= unstretched_block_states ({}) <= level_removed ({})",
                self.flattening, self.unstretched_block_states, self.level_removed
            )));
        }
        if let Some(max) = self.max_data_version {
            if max < 0 {
                return Err(ConfigError::Invalid(format!(
                    "versions.max_data_version must not be negative, got {}",
                    max
                )));
            }
        }
        Ok(())
    }
}
