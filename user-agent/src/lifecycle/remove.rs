// src/lifecycle/remove.rs

use log::Level;

use super::{Controller, RemoveOptions};
use crate::comms::{DriverChannel, ioctl};
use crate::device::{DeviceLocator, MountPoint, MountPointManager};
use crate::error::{ErrorKind, RamDiskError, Result};
use crate::ramdisk_log;
use crate::sys::{DeviceHandle, OsError};

fn inaccessible(what: &str, err: OsError) -> RamDiskError {
    ramdisk_log!(Level::Error, "remove", "{what}: {err}");
    RamDiskError::os(ErrorKind::DeviceInaccessible, what, err)
}

fn unlock(device: &mut dyn DeviceHandle) {
    if let Err(e) = ioctl::unlock_volume(device) {
        ramdisk_log!(Level::Warn, "remove", "Error unlocking volume: {e}");
    }
}

impl Controller {
    /// Remove a device and its mount point.
    pub fn remove(&self, opts: &RemoveOptions) -> Result<()> {
        let mount_point = if opts.emergency {
            self.remove_emergency(opts)?;
            opts.mount_point.clone()
        } else {
            self.remove_graceful(opts)?
        };

        if let Some(mp) = mount_point {
            ramdisk_log!(Level::Info, "remove", "Removing mountpoint...");
            if let Err(e) = MountPointManager::new(self.platform()).detach(&mp) {
                ramdisk_log!(Level::Warn, "remove", "{e}");
            }
        }

        ramdisk_log!(Level::Info, "remove", "Done.");
        Ok(())
    }

    fn remove_emergency(&self, opts: &RemoveOptions) -> Result<()> {
        let Some(number) = opts.device_number else {
            return Err(RamDiskError::new(
                ErrorKind::BadSyntax,
                "Emergency removal needs a device number",
            ));
        };
        ramdisk_log!(Level::Info, "remove", "Emergency removal...");
        self.force_remove(number)
    }

    /// Drop device `number` through the control device, open handles or not.
    pub fn force_remove(&self, number: u32) -> Result<()> {
        let channel = DriverChannel::new(self.platform(), &self.driver);
        let mut session = channel.open_control()?;
        ioctl::remove_device(session.handle(), number).map_err(|e| {
            if e.is_not_found() {
                ramdisk_log!(Level::Error, "remove", "No such device: {number}");
                RamDiskError::os(ErrorKind::DeviceNotFound, format!("No such device: {number}"), e)
            } else {
                inaccessible(&format!("Error removing device {number}"), e)
            }
        })
    }

    /// Flush, lock, dismount and eject. Returns the mount point to detach
    /// afterwards.
    fn remove_graceful(&self, opts: &RemoveOptions) -> Result<Option<MountPoint>> {
        // 1 ─ Locate
        let locator = DeviceLocator::new(self.platform());
        let mut device = match (&opts.mount_point, opts.device_number) {
            (Some(mp), _) => locator.open_by_mount_point(mp)?,
            (None, Some(number)) => locator.open_by_number(number)?,
            (None, None) => {
                return Err(RamDiskError::new(
                    ErrorKind::BadSyntax,
                    "Removal needs a device number or a mount point",
                ));
            }
        };

        // 2 ─ Is it one of ours?
        DriverChannel::validate_version(device.as_mut())?;
        let data = ioctl::query_device(device.as_mut()).map_err(|e| {
            let what = opts.mount_point.as_ref().map_or_else(|| "Device".to_string(), ToString::to_string);
            ramdisk_log!(Level::Error, "remove", "{what}: {e}. Is that drive really an ImDisk drive?");
            RamDiskError::new(
                ErrorKind::DeviceInaccessible,
                format!("{what}: Is that drive really an ImDisk drive?"),
            )
        })?;

        let mount_point = opts
            .mount_point
            .clone()
            .or_else(|| data.drive_letter.map(MountPoint::DriveLetter));

        if opts.remove_settings {
            self.remove_settings(data.device_number);
        }

        // 3 ─ Take the volume away from the filesystem
        self.release_volume(device.as_mut(), opts.force_dismount)?;

        // 4 ─ Remove
        ramdisk_log!(Level::Info, "remove", "Removing device...");
        let removed = match ioctl::eject_media(device.as_mut()) {
            Ok(()) => Ok(()),
            Err(e) if !opts.force_dismount => Err(inaccessible("Error removing device", e)),
            Err(e) => {
                ramdisk_log!(Level::Warn, "remove", "Eject failed ({e}), forcing removal...");
                self.force_remove(data.device_number)
            }
        };

        // the volume is locked from here on, whatever the outcome
        unlock(device.as_mut());
        removed.map(|()| mount_point)
    }

    fn release_volume(&self, device: &mut dyn DeviceHandle, force: bool) -> Result<()> {
        ramdisk_log!(Level::Info, "remove", "Flushing file buffers...");
        if let Err(e) = device.flush() {
            ramdisk_log!(Level::Warn, "remove", "Flush failed: {e}");
        }

        ramdisk_log!(Level::Info, "remove", "Locking volume...");
        match ioctl::lock_volume(device) {
            Ok(()) => {
                ramdisk_log!(Level::Info, "remove", "Dismounting filesystem...");
                ioctl::dismount_volume(device).map_err(|e| {
                    unlock(&mut *device);
                    inaccessible("Error dismounting filesystem", e)
                })
            }
            Err(e) if force => {
                ramdisk_log!(Level::Warn, "remove", "Locking failed ({e}), forcing dismount...");
                if let Err(e) = ioctl::dismount_volume(device) {
                    ramdisk_log!(Level::Warn, "remove", "Forced dismount: {e}");
                }
                if let Err(e) = ioctl::lock_volume(device) {
                    ramdisk_log!(Level::Warn, "remove", "Lock after dismount: {e}");
                }
                Ok(())
            }
            Err(e) => Err(inaccessible("Error locking volume", e)),
        }
    }

    fn remove_settings(&self, number: u32) {
        let Some(store) = &self.settings else {
            ramdisk_log!(Level::Warn, "remove", "No settings store configured, nothing to remove");
            return;
        };
        ramdisk_log!(Level::Info, "remove", "Removing settings for device {number}...");
        if let Err(e) = store.remove(number) {
            ramdisk_log!(Level::Warn, "remove", "Settings edit failed: {e}");
        }
    }
}
