use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Data version stamped on chunks built from scratch when the caller does not pick one.
pub const DEFAULT_DATA_VERSION: i32 = 1976;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChunkConfig {
    /// `DataVersion` written by chunk builders.
    pub data_version: i32,
    pub compression: ChunkCompression,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            data_version: DEFAULT_DATA_VERSION,
            compression: ChunkCompression::default(),
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compression.validate()?;
        if self.data_version < 0 {
            return Err(ConfigError::Invalid(format!(
                "chunk.data_version must not be negative, got {}",
                self.data_version
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChunkCompression {
    pub algorithm: Compression,
    pub level: u32,
}

impl Default for ChunkCompression {
    fn default() -> Self {
        Self {
            algorithm: Compression::ZLib,
            level: 6,
        }
    }
}

impl ChunkCompression {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level > 9 {
            return Err(ConfigError::Invalid(format!(
                "chunk.compression.level must be between 0 and 9, got {}",
                self.level
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// GZip Compression
    GZip,
    /// ZLib Compression
    ZLib,
    /// Stored as is
    Uncompressed,
}
