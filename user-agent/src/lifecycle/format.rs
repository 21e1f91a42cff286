// src/lifecycle/format.rs

//! Format Invoker.
//!
//! Runs the external format tool against a drive letter bound to the new
//! device. The whole bind → format → unbind sequence runs under one
//! system-wide lock so concurrent creators never race for the same
//! temporary letter.

use log::Level;

use crate::config::FormatConfig;
use crate::device::{AttachOutcome, MountPoint, MountPointManager};
use crate::error::{ErrorKind, RamDiskError, Result};
use crate::ramdisk_log;
use crate::sys::{NamedLock, Platform};

/// First letter from `Z:` down to `D:` that is neither a logical drive nor
/// defined as a DOS device.
pub fn find_free_drive_letter(platform: &dyn Platform) -> Option<char> {
    let in_use = platform.logical_drives();
    ('D'..='Z').rev().find(|&letter| {
        let bit = 1u32 << (letter as u32 - 'A' as u32);
        in_use & bit == 0 && platform.query_dos_device(&MountPoint::dos_name(letter)).is_err()
    })
}

/// The format lock, given back when dropped.
struct HeldLock {
    lock: Option<Box<dyn NamedLock>>,
    name: String,
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            if let Err(e) = lock.release() {
                ramdisk_log!(Level::Warn, "format", "Error releasing lock {}: {e}", self.name);
            }
        }
    }
}

pub struct FormatInvoker<'a> {
    platform: &'a dyn Platform,
    cfg: &'a FormatConfig,
}

impl<'a> FormatInvoker<'a> {
    pub fn new(platform: &'a dyn Platform, cfg: &'a FormatConfig) -> Self {
        Self { platform, cfg }
    }

    /// Format `device_path` through `drive_letter`, or through the first free
    /// letter when none is given. `options` follow the drive letter on the
    /// tool's command line.
    pub fn format(&self, device_path: &str, drive_letter: Option<char>, options: &str) -> Result<()> {
        let _lock = self.acquire()?;

        let Some(letter) = drive_letter.or_else(|| find_free_drive_letter(self.platform)) else {
            ramdisk_log!(Level::Error, "format", "Format failed. No free drive letters available.");
            return Err(RamDiskError::new(
                ErrorKind::FormatFailed,
                "Format failed. No free drive letters available.",
            ));
        };

        let manager = MountPointManager::new(self.platform);
        let mp = MountPoint::DriveLetter(letter);
        let outcome = manager.attach(&mp, device_path).map_err(|e| {
            ramdisk_log!(Level::Error, "format", "Error defining drive letter: {e}");
            RamDiskError::new(ErrorKind::FormatFailed, format!("Error defining drive letter: {e}"))
        })?;

        let result = self.run_tool(&mp, options);

        if outcome == AttachOutcome::Created {
            if let Err(e) = manager.detach_exact(letter, device_path) {
                ramdisk_log!(Level::Warn, "format", "Error undefining temporary drive letter: {e}");
            }
        }
        result
    }

    fn acquire(&self) -> Result<HeldLock> {
        let lock = self.platform.acquire_named_lock(&self.cfg.lock_name).map_err(|e| {
            ramdisk_log!(Level::Error, "format", "Error acquiring lock {}: {e}", self.cfg.lock_name);
            RamDiskError::os(ErrorKind::FormatFailed, "Error acquiring format lock", e)
        })?;
        Ok(HeldLock { lock: Some(lock), name: self.cfg.lock_name.clone() })
    }

    fn run_tool(&self, mp: &MountPoint, options: &str) -> Result<()> {
        ramdisk_log!(Level::Info, "format", "Formatting disk {mp}...");
        let args: Vec<String> = std::iter::once(mp.to_string())
            .chain(options.split_whitespace().map(str::to_string))
            .collect();

        match self.platform.run_process(&self.cfg.tool, &args) {
            Ok(0) => Ok(()),
            Ok(code) => {
                ramdisk_log!(Level::Error, "format", "{} exited with code {code}", self.cfg.tool.display());
                Err(RamDiskError::new(
                    ErrorKind::FormatFailed,
                    format!("Format of {mp} failed with exit code {code}"),
                ))
            }
            Err(e) => {
                ramdisk_log!(Level::Error, "format", "Cannot format drive: {e}");
                Err(RamDiskError::os(ErrorKind::FormatFailed, "Cannot format drive", e))
            }
        }
    }
}
