//! Public API for configuration

pub mod loader;
pub mod model;

// Re-export the main entrypoints:
pub use loader::{from_toml_str, load};
pub use model::{
    Config, ConfigError, DiskConfig, DriverConfig, FormatConfig, LoggingConfig, SettingsConfig,
};
