// src/device/mount_point.rs

//! Mount Point Manager.
//!
//! Drive letters are DOS device definitions pointing straight at the kernel
//! device; directories are NTFS mount point reparse points. Failures are
//! classified once, here, so the lifecycle code only has to decide whether a
//! given failure is fatal.

use log::Level;
use thiserror::Error;

use super::MountPoint;
use crate::ramdisk_log;
use crate::sys::{OsError, Platform, codes};

#[derive(Debug, Error)]
pub enum MountError {
    #[error("Invalid mount point path: '{0}'")]
    InvalidTarget(String),

    #[error("This version of Windows only supports drive letters as mount points")]
    Unsupported,

    #[error("Mount points are only supported on NTFS volumes")]
    NotNtfs,

    #[error("Not a mount point: '{0}'")]
    NotAMountPoint(String),

    #[error("Mount points can only be created on empty directories: '{0}'")]
    NotEmpty(String),

    #[error("{mount_point} is already bound to {target}")]
    BoundElsewhere { mount_point: String, target: String },

    #[error("{mount_point}: {source}")]
    Os {
        mount_point: String,
        #[source]
        source: OsError,
    },
}

/// Which operation produced an OS error; the same code means different
/// things when creating and when removing or opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOp {
    Attach,
    Detach,
}

#[derive(Debug, Clone, Copy)]
enum Class {
    InvalidTarget,
    Unsupported,
    NotNtfs,
    NotAMountPoint,
    NotEmpty,
}

const ATTACH_CLASSES: &[(&[u32], Class)] = &[
    (&[codes::ERROR_INVALID_REPARSE_DATA], Class::InvalidTarget),
    (&[codes::ERROR_INVALID_PARAMETER], Class::Unsupported),
    (&[codes::ERROR_INVALID_FUNCTION, codes::ERROR_NOT_A_REPARSE_POINT], Class::NotNtfs),
    (&[codes::ERROR_DIRECTORY, codes::ERROR_DIR_NOT_EMPTY], Class::NotEmpty),
];

const DETACH_CLASSES: &[(&[u32], Class)] = &[
    (&[codes::ERROR_INVALID_PARAMETER], Class::Unsupported),
    (&[codes::ERROR_INVALID_FUNCTION], Class::NotNtfs),
    (
        &[codes::ERROR_NOT_A_REPARSE_POINT, codes::ERROR_DIRECTORY, codes::ERROR_DIR_NOT_EMPTY],
        Class::NotAMountPoint,
    ),
];

/// Map an OS failure on `mp` to a [`MountError`].
pub fn classify(op: MountOp, mp: &MountPoint, err: OsError) -> MountError {
    let table = match op {
        MountOp::Attach => ATTACH_CLASSES,
        MountOp::Detach => DETACH_CLASSES,
    };
    let name = mp.to_string();
    let class = table
        .iter()
        .find(|(codes, _)| codes.contains(&err.code()))
        .map(|(_, class)| *class);

    match class {
        Some(Class::InvalidTarget) => MountError::InvalidTarget(name),
        Some(Class::Unsupported) => MountError::Unsupported,
        Some(Class::NotNtfs) => MountError::NotNtfs,
        Some(Class::NotAMountPoint) => MountError::NotAMountPoint(name),
        Some(Class::NotEmpty) => MountError::NotEmpty(name),
        None => MountError::Os { mount_point: name, source: err },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// This call created the binding.
    Created,
    /// The mount point already pointed at the device.
    Existing,
}

pub struct MountPointManager<'a> {
    platform: &'a dyn Platform,
}

impl<'a> MountPointManager<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }

    /// Bind `mp` to the kernel device `target`. A mount point that already
    /// points at `target` is left alone.
    pub fn attach(&self, mp: &MountPoint, target: &str) -> Result<AttachOutcome, MountError> {
        if matches!(mp, MountPoint::Directory(_)) && !self.platform.supports_directory_mount_points() {
            return Err(MountError::Unsupported);
        }

        match self.binding(mp) {
            Ok(Some(current)) if current == target => return Ok(AttachOutcome::Existing),
            Ok(Some(current)) => {
                return Err(MountError::BoundElsewhere { mount_point: mp.to_string(), target: current });
            }
            Ok(None) => {}
            Err(e) => return Err(classify(MountOp::Attach, mp, e)),
        }

        match mp {
            MountPoint::DriveLetter(letter) => self.define_letter(mp, *letter, target),
            MountPoint::Directory(dir) => {
                self.platform
                    .create_mount_point(dir, target)
                    .map_err(|e| classify(MountOp::Attach, mp, e))?;
                Ok(AttachOutcome::Created)
            }
        }
    }

    fn define_letter(&self, mp: &MountPoint, letter: char, target: &str) -> Result<AttachOutcome, MountError> {
        let name = MountPoint::dos_name(letter);
        self.platform
            .define_dos_device(&name, target)
            .map_err(|e| classify(MountOp::Attach, mp, e))?;

        // someone else may have raced us to the letter
        match self.platform.query_dos_device(&name) {
            Ok(current) if current == target => Ok(AttachOutcome::Created),
            found => {
                if let Err(e) = self.platform.remove_dos_device(&name, Some(target)) {
                    ramdisk_log!(Level::Warn, "mount", "Error undefining drive letter {name}: {e}");
                }
                match found {
                    Ok(current) => Err(MountError::BoundElsewhere { mount_point: name, target: current }),
                    Err(e) => Err(classify(MountOp::Attach, mp, e)),
                }
            }
        }
    }

    /// Remove whatever binding `mp` has. An unbound drive letter is not an error.
    pub fn detach(&self, mp: &MountPoint) -> Result<(), MountError> {
        match mp {
            MountPoint::DriveLetter(letter) => {
                match self.platform.remove_dos_device(&MountPoint::dos_name(*letter), None) {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(classify(MountOp::Detach, mp, e)),
                }
            }
            MountPoint::Directory(dir) => self
                .platform
                .remove_mount_point(dir)
                .map_err(|e| classify(MountOp::Detach, mp, e)),
        }
    }

    /// Remove the `letter` definition only if it still points at `target`.
    pub fn detach_exact(&self, letter: char, target: &str) -> Result<(), MountError> {
        self.platform
            .remove_dos_device(&MountPoint::dos_name(letter), Some(target))
            .map_err(|e| classify(MountOp::Detach, &MountPoint::DriveLetter(letter), e))
    }

    /// True when `mp` is unbound or already bound to `expected`.
    pub fn validate_binding(&self, mp: &MountPoint, expected: &str) -> bool {
        match self.binding(mp) {
            Ok(current) => current.is_none_or(|target| target == expected),
            Err(_) => false,
        }
    }

    /// What `mp` currently points at; `None` when unbound.
    fn binding(&self, mp: &MountPoint) -> Result<Option<String>, OsError> {
        let current = match mp {
            MountPoint::DriveLetter(letter) => self.platform.query_dos_device(&MountPoint::dos_name(*letter)),
            MountPoint::Directory(dir) => self.platform.query_mount_point(dir),
        };
        match current {
            Ok(target) => Ok(Some(target)),
            Err(e) if e.is_not_found() || e.is(codes::ERROR_NOT_A_REPARSE_POINT) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
