// src/lifecycle/mod.rs

//! Device Lifecycle Controller.
//!
//! Composes the driver channel, the locator and the mount point manager into
//! the two operations the rest of the crate needs: bring a disk into
//! existence ([`Controller::create`]) and tear it down again
//! ([`Controller::remove`]). Both are synchronous and release every handle
//! and lock they acquired on every exit path.
//!
//! Key responsibilities:
//! - Order the driver handshakes and abort on the first critical failure.
//! - Classify each failure into one [`ErrorKind`](crate::error::ErrorKind).
//! - Log and swallow failures of best-effort steps.

mod create;
mod format;
mod remove;

pub use create::nt_path_from_full;
pub use format::{FormatInvoker, find_free_drive_letter};

use std::sync::Arc;

use crate::config::{DriverConfig, FormatConfig};
use crate::device::MountPoint;
use crate::settings::SettingsStore;
use crate::sys::Platform;

/// Caller choices for [`Controller::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub mount_point: Option<MountPoint>,
    /// Arguments for the format tool after the drive letter; `None` skips formatting.
    pub format_options: Option<String>,
    pub save_settings: bool,
}

/// What [`Controller::create`] actually produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDevice {
    pub device_number: u32,
    pub device_path: String,
    /// `None` when the requested mount point could not be attached.
    pub mount_point: Option<MountPoint>,
}

/// Caller choices for [`Controller::remove`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub device_number: Option<u32>,
    pub mount_point: Option<MountPoint>,
    /// Dismount and force the removal when the volume is in use.
    pub force_dismount: bool,
    /// Skip every graceful step and drop the device by number.
    pub emergency: bool,
    pub remove_settings: bool,
}

pub struct Controller {
    platform: Arc<dyn Platform>,
    settings: Option<Arc<dyn SettingsStore>>,
    driver: DriverConfig,
    format: FormatConfig,
}

impl Controller {
    pub fn new(platform: Arc<dyn Platform>, driver: DriverConfig, format: FormatConfig) -> Self {
        Self { platform, settings: None, driver, format }
    }

    pub fn with_settings(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn format_invoker(&self) -> FormatInvoker<'_> {
        FormatInvoker::new(self.platform.as_ref(), &self.format)
    }
}
