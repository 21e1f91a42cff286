// src/device/mod.rs

//! Device identity and attachment points.
//!
//! Key responsibilities:
//! - Describe the disk to create ([`DeviceDescriptor`]).
//! - Parse and print mount points (`R:` vs. a directory).
//! - Resolve live devices ([`locator`]) and bind mount points ([`mount_point`]).

pub mod locator;
pub mod mount_point;

use std::{fmt, path::PathBuf, str::FromStr};

use shared::constants::IMDISK_AUTO_DEVICE_NUMBER;
use shared::flags::{BackingType, DeviceType};
use shared::{DeviceFlags, DiskGeometry};

pub use locator::DeviceLocator;
pub use mount_point::{AttachOutcome, MountError, MountPointManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceNumber {
    /// Let the driver pick the first free number.
    #[default]
    Auto,
    Number(u32),
}

impl DeviceNumber {
    pub fn to_raw(self) -> u32 {
        match self {
            DeviceNumber::Auto => IMDISK_AUTO_DEVICE_NUMBER,
            DeviceNumber::Number(n) => n,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        if raw == IMDISK_AUTO_DEVICE_NUMBER {
            DeviceNumber::Auto
        } else {
            DeviceNumber::Number(raw)
        }
    }

    pub fn number(self) -> Option<u32> {
        match self {
            DeviceNumber::Auto => None,
            DeviceNumber::Number(n) => Some(n),
        }
    }
}

/// Where the disk's data lives, when it is not plain virtual memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackingFile {
    /// Already a native object path, sent to the driver verbatim.
    Native(String),
    /// A user path (or shared-memory object name for proxy disks).
    Path(String),
}

/// Everything the driver needs to create one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub device_number: DeviceNumber,
    pub geometry: DiskGeometry,
    pub image_offset: i64,
    pub flags: DeviceFlags,
    pub backing_file: Option<BackingFile>,
}

impl DeviceDescriptor {
    /// A RAM disk of `size_bytes`, numbered by the driver.
    pub fn in_memory(size_bytes: u64) -> Self {
        Self {
            device_number: DeviceNumber::Auto,
            geometry: DiskGeometry::sized(size_bytes),
            image_offset: 0,
            flags: DeviceFlags::default()
                .with_device_type(DeviceType::HardDisk)
                .with_backing(BackingType::VirtualMemory),
            backing_file: None,
        }
    }
}

/// A drive letter (`R:`) or a directory on an NTFS volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MountPoint {
    DriveLetter(char),
    Directory(PathBuf),
}

impl MountPoint {
    pub fn drive_letter(&self) -> Option<char> {
        match self {
            MountPoint::DriveLetter(c) => Some(*c),
            MountPoint::Directory(_) => None,
        }
    }

    /// `R:` form used for DOS device names.
    pub fn dos_name(letter: char) -> String {
        format!("{}:", letter.to_ascii_uppercase())
    }
}

impl FromStr for MountPoint {
    type Err = std::convert::Infallible;

    /// `X:` and `X:\` are drive letters; anything else is a directory.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let letter = chars.next();
        let rest = chars.as_str();
        match letter {
            Some(c) if c.is_ascii_alphabetic() && (rest == ":" || rest == ":\\") => {
                Ok(MountPoint::DriveLetter(c.to_ascii_uppercase()))
            }
            _ => Ok(MountPoint::Directory(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountPoint::DriveLetter(c) => write!(f, "{c}:"),
            MountPoint::Directory(p) => write!(f, "{}", p.display()),
        }
    }
}
