// src/lifecycle/create.rs

use log::Level;
use shared::CreateData;
use shared::constants::{GLOBAL_OBJECTS_PREFIX, LOCAL_OBJECTS_PREFIX, device_path};

use super::{Controller, CreateOptions, CreatedDevice};
use crate::comms::{DriverChannel, ioctl};
use crate::device::{BackingFile, DeviceDescriptor, DeviceNumber, MountPoint, MountPointManager};
use crate::error::{ErrorKind, RamDiskError, Result};
use crate::ramdisk_log;
use crate::settings::DeviceSettings;

/// NT form of an absolute Win32 path, as the driver expects file names:
/// `C:\x` → `\??\C:\x`, `\\srv\share` → `\??\UNC\srv\share`,
/// `\\?\X` and `\\.\X` → `\??\X`. `None` for anything not absolute.
pub fn nt_path_from_full(full: &str) -> Option<String> {
    if let Some(rest) = full.strip_prefix(r"\\?\").or_else(|| full.strip_prefix(r"\\.\")) {
        return Some(format!(r"\??\{rest}"));
    }
    if let Some(rest) = full.strip_prefix(r"\\") {
        return Some(format!(r"\??\UNC\{rest}"));
    }
    let bytes = full.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\' {
        return Some(format!(r"\??\{full}"));
    }
    None
}

impl Controller {
    /// Create the device described by `desc` and attach it.
    ///
    /// On success `desc.device_number` holds the number the driver assigned.
    pub fn create(&self, desc: &mut DeviceDescriptor, opts: &CreateOptions) -> Result<CreatedDevice> {
        let platform = self.platform();

        // 1 ─ Driver session & helpers
        let channel = DriverChannel::new(platform, &self.driver);
        let mut session = channel.open_control()?;
        DriverChannel::validate_version(session.handle())?;
        channel.ensure_auxiliary(desc.flags)?;

        // 2 ─ Creation record
        let file_name = self.resolve_backing(desc)?;
        let requested_letter = opts.mount_point.as_ref().and_then(MountPoint::drive_letter);
        let request = CreateData {
            device_number: desc.device_number.to_raw(),
            geometry: desc.geometry,
            image_offset: desc.image_offset,
            flags: desc.flags,
            drive_letter: requested_letter,
            file_name,
        };

        // 3 ─ Create
        ramdisk_log!(Level::Info, "create", "Creating device...");
        let reply = ioctl::create_device(session.handle(), &request).map_err(|e| {
            ramdisk_log!(Level::Error, "create", "Error creating virtual disk: {e}");
            match e {
                ioctl::IoctlError::Os(os) => {
                    RamDiskError::os(ErrorKind::CreateDeviceFailed, "Error creating virtual disk", os)
                }
                ioctl::IoctlError::Protocol(p) => RamDiskError::new(
                    ErrorKind::CreateDeviceFailed,
                    format!("Error creating virtual disk: {p}"),
                ),
            }
        })?;
        drop(session);

        desc.device_number = DeviceNumber::Number(reply.device_number);
        let path = device_path(reply.device_number);

        // 4 ─ Mount point
        let mount_point = opts.mount_point.as_ref().and_then(|mp| {
            if requested_letter.is_some() && reply.drive_letter == requested_letter {
                return Some(mp.clone());
            }
            match MountPointManager::new(platform).attach(mp, &path) {
                Ok(_) => Some(mp.clone()),
                Err(e) => {
                    ramdisk_log!(Level::Warn, "create", "{e}");
                    ramdisk_log!(Level::Warn, "create", "Warning: The device is created without a mount point.");
                    None
                }
            }
        });

        ramdisk_log!(
            Level::Info,
            "create",
            "Created device {}: {} -> {}",
            reply.device_number,
            mount_point.as_ref().map_or_else(|| "No mountpoint".to_string(), ToString::to_string),
            if reply.file_name.is_empty() { "Image in memory" } else { reply.file_name.as_str() }
        );

        // 5 ─ Settings
        if opts.save_settings {
            self.save_settings(&reply);
        }

        // 6 ─ Format
        if let Some(options) = &opts.format_options {
            let letter = mount_point.as_ref().and_then(MountPoint::drive_letter);
            self.format_invoker().format(&path, letter, options)?;
        }

        Ok(CreatedDevice { device_number: reply.device_number, device_path: path, mount_point })
    }

    fn resolve_backing(&self, desc: &DeviceDescriptor) -> Result<String> {
        match &desc.backing_file {
            None => Ok(String::new()),
            Some(BackingFile::Native(name)) => Ok(name.clone()),
            Some(BackingFile::Path(name)) if desc.flags.is_shared_memory_proxy() => {
                let prefix = match self.platform().probe_global_namespace() {
                    Err(e) if e.is_not_found() => LOCAL_OBJECTS_PREFIX,
                    _ => GLOBAL_OBJECTS_PREFIX,
                };
                Ok(format!("{prefix}{name}"))
            }
            Some(BackingFile::Path(path)) => {
                let full = self.platform().full_path(path).map_err(|e| {
                    ramdisk_log!(Level::Error, "create", "Cannot resolve image path {path}: {e}");
                    RamDiskError::os(ErrorKind::Fatal, format!("Cannot resolve image path {path}"), e)
                })?;
                nt_path_from_full(&full).ok_or_else(|| {
                    ramdisk_log!(Level::Error, "create", "Cannot convert {full} to a native path");
                    RamDiskError::new(ErrorKind::Fatal, format!("Cannot convert {full} to a native path"))
                })
            }
        }
    }

    fn save_settings(&self, data: &CreateData) {
        let Some(store) = &self.settings else {
            ramdisk_log!(Level::Warn, "create", "No settings store configured, settings not saved");
            return;
        };
        ramdisk_log!(Level::Info, "create", "Saving settings...");
        if let Err(e) = store.save(data.device_number, &DeviceSettings::from(data)) {
            ramdisk_log!(Level::Warn, "create", "Settings edit failed: {e}");
        }
    }
}
