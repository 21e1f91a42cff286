//! JSON settings file with HMAC integrity.
//!
//! Key responsibilities:
//! - Load and save the device map from/to disk.
//! - Ensure integrity using HMAC-SHA256 signatures.
//! - Fall back to an empty map when the file was tampered with.

use hmac::{Hmac, Mac};
use log::Level;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{DeviceSettings, SettingsError, SettingsStore};
use crate::ramdisk_log;

type HmacSha256 = Hmac<Sha256>;

static HMAC_KEY: &[u8] = b"ramdisk-device-settings";

/// On-disk layout: the device map plus the signature of its pretty JSON.
#[derive(Serialize, Deserialize)]
struct SettingsWrapper {
    devices: BTreeMap<u32, DeviceSettings>,
    signature: String,
}

/// Computes an HMAC signature (hex-encoded) for the given data.
fn compute_signature(data: &str) -> Result<String, SettingsError> {
    let mut mac = HmacSha256::new_from_slice(HMAC_KEY).map_err(|_| SettingsError::Signing)?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub struct JsonSettingsStore {
    path: PathBuf,
    // serialises read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), guard: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<u32, DeviceSettings>, SettingsError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let wrapper: SettingsWrapper = match serde_json::from_reader(BufReader::new(file)) {
            Ok(w) => w,
            Err(e) => {
                ramdisk_log!(Level::Warn, "settings", "Unreadable settings file {:?}: {e}. Starting empty.", self.path);
                return Ok(BTreeMap::new());
            }
        };
        let json_data = serde_json::to_string_pretty(&wrapper.devices)?;
        if compute_signature(&json_data)? != wrapper.signature {
            ramdisk_log!(
                Level::Warn,
                "settings",
                "Settings signature mismatch in {:?}. Starting with empty settings.",
                self.path
            );
            return Ok(BTreeMap::new());
        }
        Ok(wrapper.devices)
    }

    fn store(&self, devices: BTreeMap<u32, DeviceSettings>) -> Result<(), SettingsError> {
        let json_data = serde_json::to_string_pretty(&devices)?;
        let signature = compute_signature(&json_data)?;
        let wrapper = SettingsWrapper { devices, signature };
        fs::write(&self.path, serde_json::to_string_pretty(&wrapper)?)?;
        Ok(())
    }

    fn update(&self, edit: impl FnOnce(&mut BTreeMap<u32, DeviceSettings>)) -> Result<(), SettingsError> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        let mut devices = self.load()?;
        edit(&mut devices);
        self.store(devices)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn save(&self, device_number: u32, record: &DeviceSettings) -> Result<(), SettingsError> {
        self.update(|devices| {
            devices.insert(device_number, record.clone());
        })
    }

    fn remove(&self, device_number: u32) -> Result<(), SettingsError> {
        self.update(|devices| {
            devices.remove(&device_number);
        })
    }

    fn records(&self) -> Result<BTreeMap<u32, DeviceSettings>, SettingsError> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        self.load()
    }
}
