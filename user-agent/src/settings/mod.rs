//! Persisted device parameters.
//!
//! A created device can be recorded so it is recreated the same way later,
//! and its record dropped again when the device is removed. Both operations
//! are best-effort for the lifecycle code: a failing store is logged and
//! never changes the result of a create or remove.

pub mod store;

use serde::{Deserialize, Serialize};
use shared::CreateData;
use std::collections::BTreeMap;
use thiserror::Error;

pub use store::JsonSettingsStore;

/// Parameters of one device, as needed to create it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Disk size in bytes (the geometry's cylinder field).
    pub size: i64,
    pub flags: u32,
    pub drive_letter: Option<char>,
    pub image_offset: i64,
    #[serde(default)]
    pub file_name: String,
}

impl From<&CreateData> for DeviceSettings {
    fn from(data: &CreateData) -> Self {
        Self {
            size: data.geometry.cylinders,
            flags: data.flags.bits(),
            drive_letter: data.drive_letter,
            image_offset: data.image_offset,
            file_name: data.file_name.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot initialise settings signature")]
    Signing,
}

pub trait SettingsStore: Send + Sync {
    fn save(&self, device_number: u32, record: &DeviceSettings) -> Result<(), SettingsError>;

    fn remove(&self, device_number: u32) -> Result<(), SettingsError>;

    fn records(&self) -> Result<BTreeMap<u32, DeviceSettings>, SettingsError>;
}
