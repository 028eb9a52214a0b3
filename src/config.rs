//! Simulator configuration for the `serve` command
//!
//! ```toml
//! unique_id = "000102030405060708090a0b0c0d0e0f"
//!
//! [internal]
//! image = "internal.bin"
//! persist = true
//!
//! [external]
//! image = "dataflash.bin"
//! offset = 0x800
//!
//! [faults]
//! busy_polls = 4
//! program_error = false
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use stormloader_core::config::DEVICE_ID_LEN;

/// Errors loading a simulator configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid unique_id: {0}")]
    UniqueId(String),
}

/// Top-level simulator configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Device serial as 32 hex digits
    pub unique_id: Option<String>,
    pub internal: FlashImage,
    pub external: FlashImage,
    pub faults: Faults,
}

/// Backing file for one of the emulated flashes
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashImage {
    /// File loaded into the flash at start-up
    pub image: Option<PathBuf>,
    /// Where in the flash the file is placed
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub offset: u32,
    /// Write the flash contents back to `image` when a client disconnects
    pub persist: bool,
}

/// Injected hardware faults
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Faults {
    /// Status reads reporting busy after each DataFlash erase/program
    pub busy_polls: u32,
    /// DataFlash never leaves busy
    pub stuck_busy: bool,
    /// DataFlash reports an erase/program error
    pub program_error: bool,
    /// Internal page erases fail
    pub internal_erase_error: bool,
    /// Internal page writes fail
    pub internal_write_error: bool,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            busy_polls: 2,
            stuck_busy: false,
            program_error: false,
            internal_erase_error: false,
            internal_write_error: false,
        }
    }
}

/// Deserialize a u32 that can be hex (0x...) or decimal
fn deserialize_hex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => crate::cli::parse_hex_u32(s.trim()).map_err(serde::de::Error::custom),
    }
}

impl SimConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(content)?;
        config.unique_id()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// The configured serial, if any
    pub fn unique_id(&self) -> Result<Option<[u8; DEVICE_ID_LEN]>, ConfigError> {
        let Some(hex) = &self.unique_id else {
            return Ok(None);
        };
        if hex.len() != DEVICE_ID_LEN * 2 || !hex.is_ascii() {
            return Err(ConfigError::UniqueId(format!(
                "expected {} hex digits",
                DEVICE_ID_LEN * 2
            )));
        }
        let mut id = [0u8; DEVICE_ID_LEN];
        for (i, b) in id.iter_mut().enumerate() {
            *b = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|e| ConfigError::UniqueId(e.to_string()))?;
        }
        Ok(Some(id))
    }
}
