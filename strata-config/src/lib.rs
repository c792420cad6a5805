use std::{fs, io, path::Path};

use log::{debug, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

pub mod chunk;
pub mod versions;

pub use chunk::{ChunkCompression, ChunkConfig, Compression, DEFAULT_DATA_VERSION};
pub use versions::VersionConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't read configuration file: {0}")]
    Io(#[from] io::Error),
    #[error("Couldn't parse configuration. Reason: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Couldn't serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything that controls how chunks and regions are read and written.
///
/// The defaults match what the game itself writes.
#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfiguration {
    pub chunk: ChunkConfig,
    pub versions: VersionConfig,
}

pub trait LoadConfiguration {
    /// Loads `<dir>/<file>`, falling back to the defaults when the file does not exist yet.
    fn load(dir: &Path) -> Result<Self, ConfigError>
    where
        Self: Sized + Default + Serialize + DeserializeOwned,
    {
        let path = dir.join(Self::get_path());

        let config = if path.exists() {
            let file_content = fs::read_to_string(&path)?;
            toml::from_str(&file_content)?
        } else {
            debug!("no configuration at {:?}, using defaults", &path);
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration to `<dir>/<file>`, creating `dir` when needed.
    fn save(&self, dir: &Path) -> Result<(), ConfigError>
    where
        Self: Serialize,
    {
        if !dir.exists() {
            debug!("creating config folder {:?}", dir);
            fs::create_dir_all(dir)?;
        }
        let path = dir.join(Self::get_path());
        if let Err(err) = fs::write(&path, toml::to_string(self)?) {
            warn!("Couldn't write config to {:?}. Reason: {}", &path, err);
            return Err(err.into());
        }
        Ok(())
    }

    fn get_path() -> &'static Path;

    fn validate(&self) -> Result<(), ConfigError>;
}

impl LoadConfiguration for StorageConfiguration {
    fn get_path() -> &'static Path {
        Path::new("storage.toml")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.chunk.validate()?;
        self.versions.validate()
    }
}
