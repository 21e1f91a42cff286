// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads `default.toml`, deserializes into `RawConfig`, and validates it
//! into the runtime `Config`.

use crate::config::model::{Config, ConfigError, RawConfig};
use crate::ramdisk_log;
use log::Level;
use std::{fs, path::Path};

/// Load and validate the configuration at `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    ramdisk_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = from_toml_str(&txt)?;
    ramdisk_log!(Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse configuration text; missing tables and keys take their defaults.
pub fn from_toml_str(txt: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(txt)?;
    Config::try_from(raw)
}
