//! Tunables for filters and storage

use crate::store::DEFAULT_COMPRESSION_LEVEL;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration shared by the library helpers and the `bloomtree` binary
///
/// Every field has a default, so a config file only needs the keys it
/// changes:
///
/// ```json
/// { "filter_bytes": 64 }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Size in bytes of each bloom filter built for [`crate::Text`] values
    pub filter_bytes: usize,
    /// Number of bit positions set per added element
    pub filter_hashes: u8,
    /// zstd level for stored blocks
    pub compression_level: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            filter_bytes: 32,
            filter_hashes: 3,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Config {
    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let config: Config = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would produce unusable filters
    pub fn validate(&self) -> Result<()> {
        if self.filter_bytes == 0 {
            return Err(Error::Config("filter_bytes must be positive".into()));
        }
        if self.filter_hashes == 0 {
            return Err(Error::Config("filter_hashes must be positive".into()));
        }
        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression_level {} is outside the zstd range",
                self.compression_level
            )));
        }
        Ok(())
    }
}
