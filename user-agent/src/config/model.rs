// src/config/model.rs

use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

use crate::device::MountPoint;

const GIB: u64 = 1 << 30;

pub const DEFAULT_DRIVE_LETTER: char = 'R';
pub const DEFAULT_SIZE_BYTES: u64 = 7 * GIB;
pub const DEFAULT_FORMAT_OPTIONS: &str = "/fs:ntfs /q /y";
pub const DEFAULT_OPEN_ATTEMPTS: u32 = 64;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_POLL_ATTEMPTS: u32 = 150;
pub const DEFAULT_FORMAT_TOOL: &str = r"C:\Windows\System32\format.com";
pub const DEFAULT_FORMAT_LOCK: &str = "ImDiskFormat";
pub const DEFAULT_SETTINGS_FILE: &str = "ramdisk-settings.json";

/// Top-level runtime config
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub disk: DiskConfig,
    pub driver: DriverConfig,
    pub format: FormatConfig,
    pub settings: SettingsConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Disk the service keeps mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskConfig {
    pub drive_letter: char,
    pub size_bytes: u64,
    /// `None` leaves the volume unformatted.
    pub format_options: Option<String>,
    pub force_dismount: bool,
    pub save_settings: bool,
}

impl DiskConfig {
    pub fn mount_point(&self) -> MountPoint {
        MountPoint::DriveLetter(self.drive_letter)
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            drive_letter: DEFAULT_DRIVE_LETTER,
            size_bytes: DEFAULT_SIZE_BYTES,
            format_options: Some(DEFAULT_FORMAT_OPTIONS.into()),
            force_dismount: true,
            save_settings: false,
        }
    }
}

/// Bounds for the driver and helper service handshakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub open_attempts: u32,
    pub service_poll_interval: Duration,
    pub service_poll_attempts: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            open_attempts: DEFAULT_OPEN_ATTEMPTS,
            service_poll_interval: DEFAULT_POLL_INTERVAL,
            service_poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatConfig {
    pub tool: PathBuf,
    pub lock_name: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self { tool: PathBuf::from(DEFAULT_FORMAT_TOOL), lock_name: DEFAULT_FORMAT_LOCK.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsConfig {
    pub path: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self { path: PathBuf::from(DEFAULT_SETTINGS_FILE) }
    }
}

/*────────── raw TOML mirror ─────────*/

/// Holds the tables exactly as written in TOML
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub logging: LoggingConfig,
    pub disk: RawDisk,
    pub driver: RawDriver,
    pub format: RawFormat,
    pub settings: RawSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RawDisk {
    pub drive_letter: String,
    pub size_bytes: u64,
    pub format_options: String,
    pub force_dismount: bool,
    pub save_settings: bool,
}

impl Default for RawDisk {
    fn default() -> Self {
        Self {
            drive_letter: format!("{DEFAULT_DRIVE_LETTER}:"),
            size_bytes: DEFAULT_SIZE_BYTES,
            format_options: DEFAULT_FORMAT_OPTIONS.into(),
            force_dismount: true,
            save_settings: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RawDriver {
    pub open_attempts: u32,
    pub service_poll_interval: String,
    pub service_poll_attempts: u32,
}

impl Default for RawDriver {
    fn default() -> Self {
        Self {
            open_attempts: DEFAULT_OPEN_ATTEMPTS,
            service_poll_interval: "200ms".into(),
            service_poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RawFormat {
    pub tool: String,
    pub lock_name: String,
}

impl Default for RawFormat {
    fn default() -> Self {
        Self { tool: DEFAULT_FORMAT_TOOL.into(), lock_name: DEFAULT_FORMAT_LOCK.into() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub path: String,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self { path: DEFAULT_SETTINGS_FILE.into() }
    }
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid drive letter '{0}'")]
    InvalidDriveLetter(String),

    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("disk size must be greater than zero")]
    ZeroSize,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let drive_letter = match raw.disk.drive_letter.parse::<MountPoint>() {
            Ok(MountPoint::DriveLetter(letter)) => letter,
            _ => return Err(ConfigError::InvalidDriveLetter(raw.disk.drive_letter)),
        };
        if raw.disk.size_bytes == 0 {
            return Err(ConfigError::ZeroSize);
        }
        let interval = humantime::parse_duration(&raw.driver.service_poll_interval)
            .map_err(|e| ConfigError::InvalidDuration(raw.driver.service_poll_interval.clone(), e))?;
        let options = raw.disk.format_options.trim();

        Ok(Config {
            logging: raw.logging,
            disk: DiskConfig {
                drive_letter,
                size_bytes: raw.disk.size_bytes,
                format_options: (!options.is_empty()).then(|| options.to_string()),
                force_dismount: raw.disk.force_dismount,
                save_settings: raw.disk.save_settings,
            },
            driver: DriverConfig {
                open_attempts: raw.driver.open_attempts.max(1),
                service_poll_interval: interval,
                service_poll_attempts: raw.driver.service_poll_attempts,
            },
            format: FormatConfig {
                tool: PathBuf::from(raw.format.tool),
                lock_name: raw.format.lock_name,
            },
            settings: SettingsConfig { path: PathBuf::from(raw.settings.path) },
        })
    }
}
