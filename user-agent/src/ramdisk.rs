// src/ramdisk.rs

//! Facade: the one RAM disk the service keeps mounted.
//!
//! [`RamDisk`] remembers the device it created and whether it is attached;
//! [`RamDiskOwner`] holds the single live instance for the process.

use log::Level;

use crate::config::DiskConfig;
use crate::device::{DeviceDescriptor, DeviceNumber};
use crate::error::{ErrorKind, Result};
use crate::lifecycle::{Controller, CreateOptions, RemoveOptions};
use crate::ramdisk_log;

pub struct RamDisk {
    controller: Controller,
    disk: DiskConfig,
    descriptor: DeviceDescriptor,
    attached: bool,
}

impl RamDisk {
    pub fn new(controller: Controller, disk: DiskConfig) -> Self {
        let descriptor = DeviceDescriptor::in_memory(disk.size_bytes);
        Self { controller, disk, descriptor, attached: false }
    }

    /// Reset the descriptor: configured size, zero offset, number chosen by
    /// the driver.
    pub fn init(&mut self) {
        ramdisk_log!(Level::Debug, "facade", "init");
        self.descriptor = DeviceDescriptor::in_memory(self.disk.size_bytes);
    }

    /// Create, attach and format the disk. Does nothing when already attached.
    pub fn mount(&mut self) -> Result<()> {
        if self.attached {
            ramdisk_log!(Level::Debug, "facade", "mount: already attached");
            return Ok(());
        }
        ramdisk_log!(Level::Info, "facade", "Mounting {} bytes on {}", self.disk.size_bytes, self.disk.mount_point());

        let opts = CreateOptions {
            mount_point: Some(self.disk.mount_point()),
            format_options: self.disk.format_options.clone(),
            save_settings: self.disk.save_settings,
        };
        let result = self.controller.create(&mut self.descriptor, &opts);

        // a device that exists must be torn down later, even if formatting failed
        if self.descriptor.device_number != DeviceNumber::Auto {
            self.attached = true;
        }
        result.map(|_| ())
    }

    /// Detach and destroy the disk. Safe to call in any state.
    pub fn unmount(&mut self) -> Result<()> {
        if !self.attached {
            ramdisk_log!(Level::Debug, "facade", "unmount: nothing attached");
            return Ok(());
        }

        let opts = RemoveOptions {
            device_number: self.descriptor.device_number.number(),
            mount_point: Some(self.disk.mount_point()),
            force_dismount: self.disk.force_dismount,
            emergency: false,
            remove_settings: self.disk.save_settings,
        };
        let result = self.controller.remove(&opts);
        match &result {
            Err(e) if e.kind() != ErrorKind::DeviceNotFound => {
                ramdisk_log!(Level::Error, "facade", "unmount failed, disk stays attached: {e}");
            }
            _ => {
                self.attached = false;
                self.descriptor.device_number = DeviceNumber::Auto;
            }
        }
        result
    }

    pub fn was_mounted(&self) -> bool {
        self.attached
    }

    pub fn device_number(&self) -> DeviceNumber {
        self.descriptor.device_number
    }
}

/// Owner of the process-wide [`RamDisk`]: built on first access, destroyed
/// explicitly, and built again on the next access after that.
pub struct RamDiskOwner<F> {
    factory: F,
    instance: Option<RamDisk>,
}

impl<F: FnMut() -> RamDisk> RamDiskOwner<F> {
    pub fn new(factory: F) -> Self {
        Self { factory, instance: None }
    }

    pub fn get(&mut self) -> &mut RamDisk {
        let factory = &mut self.factory;
        self.instance.get_or_insert_with(|| {
            let mut disk = factory();
            disk.init();
            disk
        })
    }

    pub fn is_alive(&self) -> bool {
        self.instance.is_some()
    }

    pub fn destroy(&mut self) {
        if self.instance.take().is_some() {
            ramdisk_log!(Level::Debug, "facade", "instance destroyed");
        }
    }
}
