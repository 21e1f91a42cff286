// src/device/locator.rs

//! Device Locator: handles on devices that already exist.

use log::Level;
use shared::constants::device_path;

use super::MountPoint;
use super::mount_point::{MountOp, classify};
use crate::error::{ErrorKind, RamDiskError, Result};
use crate::ramdisk_log;
use crate::sys::{ACCESS_FALLBACK, DeviceHandle, OsError, Platform, first_success};

pub struct DeviceLocator<'a> {
    platform: &'a dyn Platform,
}

impl<'a> DeviceLocator<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }

    /// Open `\Device\ImDisk<number>` with the strongest access granted.
    pub fn open_by_number(&self, number: u32) -> Result<Box<dyn DeviceHandle>> {
        let path = device_path(number);
        ramdisk_log!(Level::Debug, "locate", "Opening {path}...");
        first_success(ACCESS_FALLBACK, |access| self.platform.open_device(&path, access))
            .map_err(|e| open_failure(&path, e))
    }

    /// Open the device bound to `mp`. For drive letters running applications
    /// are told first that the volume is about to go away.
    pub fn open_by_mount_point(&self, mp: &MountPoint) -> Result<Box<dyn DeviceHandle>> {
        match mp {
            MountPoint::DriveLetter(letter) => {
                if letter.is_ascii_uppercase() {
                    ramdisk_log!(Level::Info, "locate", "Notifying applications...");
                    self.platform.notify_remove_pending(*letter);
                }
                let path = format!(r"\\.\{letter}:");
                ramdisk_log!(Level::Debug, "locate", "Opening {mp}...");
                first_success(ACCESS_FALLBACK, |access| self.platform.open_device(&path, access))
                    .map_err(|e| open_failure(&mp.to_string(), e))
            }
            MountPoint::Directory(dir) => {
                first_success(ACCESS_FALLBACK, |access| self.platform.open_mount_point(dir, access))
                    .map_err(|e| {
                        let reason = classify(MountOp::Detach, mp, e);
                        ramdisk_log!(Level::Error, "locate", "{reason}");
                        RamDiskError::new(ErrorKind::BadMountPoint, reason.to_string())
                    })
            }
        }
    }
}

fn open_failure(what: &str, err: OsError) -> RamDiskError {
    if err.is_not_found() {
        ramdisk_log!(Level::Error, "locate", "No such device: {what}");
        RamDiskError::os(ErrorKind::DeviceNotFound, format!("No such device: {what}"), err)
    } else {
        ramdisk_log!(Level::Error, "locate", "Error opening device {what}: {err}");
        RamDiskError::os(ErrorKind::DeviceInaccessible, format!("Error opening device {what}"), err)
    }
}
