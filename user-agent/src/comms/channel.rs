// src/comms/channel.rs

//! Driver Channel: reaching the ImDisk control device.
//!
//! Key responsibilities:
//! - Open the control device, loading the driver on demand.
//! - Validate the protocol version on any ImDisk handle.
//! - Bring up the helper the device type depends on (AWEAlloc for physical
//!   memory disks, the proxy service for TCP / comm-port proxies).

use log::Level;
use shared::DeviceFlags;
use shared::constants::{
    AWEALLOC_DEVICE_NAME, AWEALLOC_DRIVER_NAME, IMDISK_CTL_DEVICE_NAME, IMDISK_DRIVER_NAME,
    IMDISK_DRIVER_VERSION, IMDPROXY_SVC, IMDPROXY_SVC_PIPE_DOSDEV_NAME,
};
use thiserror::Error;

use crate::comms::ioctl;
use crate::config::DriverConfig;
use crate::error::{ErrorKind, RamDiskError, Result};
use crate::ramdisk_log;
use crate::sys::{Access, DeviceHandle, OsError, Platform, codes};

/// Why a driver or service could not be started.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("cannot load {0}, its image file is missing")]
    BinaryMissing(String),

    #[error("{0} is disabled")]
    Disabled(String),

    #[error("error starting {service}: {source}")]
    Os {
        service: String,
        #[source]
        source: OsError,
    },
}

impl ServiceError {
    fn classify(service: &str, err: OsError) -> Self {
        match err.code() {
            codes::ERROR_SERVICE_DOES_NOT_EXIST => Self::NotInstalled(service.into()),
            codes::ERROR_PATH_NOT_FOUND | codes::ERROR_FILE_NOT_FOUND => {
                Self::BinaryMissing(service.into())
            }
            codes::ERROR_SERVICE_DISABLED => Self::Disabled(service.into()),
            _ => Self::Os { service: service.into(), source: err },
        }
    }
}

/// An open handle on the control device. Closed when dropped.
pub struct DriverSession {
    handle: Box<dyn DeviceHandle>,
}

impl DriverSession {
    pub fn handle(&mut self) -> &mut dyn DeviceHandle {
        self.handle.as_mut()
    }
}

enum OpenFailure {
    Open(OsError),
    Start(ServiceError),
    Exhausted,
}

pub struct DriverChannel<'a> {
    platform: &'a dyn Platform,
    cfg: &'a DriverConfig,
}

impl<'a> DriverChannel<'a> {
    pub fn new(platform: &'a dyn Platform, cfg: &'a DriverConfig) -> Self {
        Self { platform, cfg }
    }

    /// Start `service`. A service that is already running counts as loaded.
    pub fn ensure_loaded(&self, service: &str) -> std::result::Result<(), ServiceError> {
        match self.platform.start_service(service) {
            Ok(()) => Ok(()),
            Err(e) if e.is(codes::ERROR_SERVICE_ALREADY_RUNNING) => Ok(()),
            Err(e) => Err(ServiceError::classify(service, e)),
        }
    }

    /// Open `device`, starting `service` whenever the device does not exist
    /// yet. Bounded by `open_attempts`.
    fn open_loading(&self, device: &str, service: &str) -> std::result::Result<Box<dyn DeviceHandle>, OpenFailure> {
        for _ in 0..self.cfg.open_attempts {
            match self.platform.open_device(device, Access::ReadWrite) {
                Ok(handle) => return Ok(handle),
                Err(e) if e.is_not_found() => {
                    self.ensure_loaded(service).map_err(OpenFailure::Start)?;
                    ramdisk_log!(Level::Info, "driver", "{service} was loaded into the kernel.");
                    self.platform.yield_now();
                }
                Err(e) => return Err(OpenFailure::Open(e)),
            }
        }
        Err(OpenFailure::Exhausted)
    }

    pub fn open_control(&self) -> Result<DriverSession> {
        match self.open_loading(IMDISK_CTL_DEVICE_NAME, IMDISK_DRIVER_NAME) {
            Ok(handle) => Ok(DriverSession { handle }),
            Err(OpenFailure::Open(e)) => {
                ramdisk_log!(Level::Error, "driver", "Error controlling the ImDisk Virtual Disk Driver: {e}");
                Err(RamDiskError::os(
                    ErrorKind::DriverInaccessible,
                    "Error controlling the ImDisk Virtual Disk Driver",
                    e,
                ))
            }
            Err(OpenFailure::Start(e)) => {
                ramdisk_log!(Level::Error, "driver", "ImDisk Virtual Disk Driver: {e}. Please re-install ImDisk.");
                Err(RamDiskError::new(ErrorKind::DriverNotInstalled, e.to_string()))
            }
            Err(OpenFailure::Exhausted) => {
                ramdisk_log!(
                    Level::Error,
                    "driver",
                    "Control device still missing after {} attempts",
                    self.cfg.open_attempts
                );
                Err(RamDiskError::new(
                    ErrorKind::DriverInaccessible,
                    "ImDisk control device did not appear after loading the driver",
                ))
            }
        }
    }

    /// Fail unless `handle` belongs to an ImDisk driver speaking our protocol.
    pub fn validate_version(handle: &mut dyn DeviceHandle) -> Result<()> {
        let wrong = |msg: String| {
            ramdisk_log!(Level::Error, "driver", "{msg}");
            Err(RamDiskError::new(ErrorKind::DriverWrongVersion, msg))
        };
        match ioctl::query_version(handle) {
            Ok(Some(IMDISK_DRIVER_VERSION)) => Ok(()),
            Ok(Some(found)) => wrong(format!(
                "Wrong version of ImDisk Virtual Disk Driver. Expected: {}.{} Installed: {}.{}",
                IMDISK_DRIVER_VERSION >> 8,
                IMDISK_DRIVER_VERSION & 0xFF,
                (found >> 8) & 0xFF,
                found & 0xFF
            )),
            Ok(None) => wrong(format!(
                "Wrong version of ImDisk Virtual Disk Driver. No current driver version information, expected: {}.{}",
                IMDISK_DRIVER_VERSION >> 8,
                IMDISK_DRIVER_VERSION & 0xFF
            )),
            Err(e) if e.is(codes::ERROR_INVALID_FUNCTION) || e.is(codes::ERROR_NOT_SUPPORTED) => {
                wrong("Not an ImDisk device.".into())
            }
            Err(e) => {
                ramdisk_log!(Level::Error, "driver", "Error opening device: {e}");
                Err(RamDiskError::os(ErrorKind::DriverWrongVersion, "Error opening device", e))
            }
        }
    }

    /// Bring up whatever `flags` depends on besides the driver itself.
    pub fn ensure_auxiliary(&self, flags: DeviceFlags) -> Result<()> {
        if flags.needs_awealloc() {
            self.ensure_awealloc()
        } else if flags.needs_proxy_service() {
            self.ensure_proxy_service()
        } else {
            Ok(())
        }
    }

    fn ensure_awealloc(&self) -> Result<()> {
        match self.open_loading(AWEALLOC_DEVICE_NAME, AWEALLOC_DRIVER_NAME) {
            Ok(_probe) => Ok(()),
            Err(OpenFailure::Open(e)) => {
                // the driver reports the real problem when it needs AWEAlloc
                ramdisk_log!(Level::Warn, "driver", "Cannot open {AWEALLOC_DEVICE_NAME}: {e}");
                Ok(())
            }
            Err(OpenFailure::Start(e)) => {
                ramdisk_log!(Level::Error, "driver", "AWEAlloc driver: {e}. Please re-install ImDisk.");
                Err(RamDiskError::new(ErrorKind::AuxServiceInaccessible, e.to_string()))
            }
            Err(OpenFailure::Exhausted) => Err(RamDiskError::new(
                ErrorKind::AuxServiceInaccessible,
                "AWEAlloc device did not appear after loading the driver",
            )),
        }
    }

    fn ensure_proxy_service(&self) -> Result<()> {
        match self.platform.probe_pipe(IMDPROXY_SVC_PIPE_DOSDEV_NAME) {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_not_found() => {
                ramdisk_log!(Level::Debug, "driver", "Helper pipe probe: {e}");
                return Ok(());
            }
            Err(_) => {}
        }

        if let Err(e) = self.ensure_loaded(IMDPROXY_SVC) {
            ramdisk_log!(Level::Error, "driver", "ImDisk Virtual Disk Driver Helper Service: {e}");
            return Err(RamDiskError::new(ErrorKind::AuxServiceInaccessible, e.to_string()));
        }

        for _ in 0..self.cfg.service_poll_attempts {
            match self.platform.probe_pipe(IMDPROXY_SVC_PIPE_DOSDEV_NAME) {
                Ok(()) => {
                    ramdisk_log!(Level::Info, "driver", "The ImDisk Virtual Disk Driver Helper Service was started.");
                    return Ok(());
                }
                Err(e) if e.is_not_found() => self.platform.sleep(self.cfg.service_poll_interval),
                Err(e) => {
                    ramdisk_log!(Level::Debug, "driver", "Helper pipe probe: {e}");
                    return Ok(());
                }
            }
        }

        ramdisk_log!(Level::Error, "driver", "Helper service pipe never appeared");
        Err(RamDiskError::new(
            ErrorKind::AuxServiceInaccessible,
            "ImDisk Virtual Disk Driver Helper Service did not open its pipe",
        ))
    }
}
