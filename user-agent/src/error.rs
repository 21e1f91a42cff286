// src/error.rs

//! Result taxonomy shared by every lifecycle operation.
//!
//! Callers outside the crate (the service, `ramdiskctl`, scripts reading the
//! process exit code) only ever see one of the classes below, each with a
//! stable numeric code. The message says which step failed and carries the
//! OS text. The raw OS error is reachable through [`RamDiskError::os_error`],
//! not as a chained source.

use thiserror::Error;

use crate::sys::OsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DeviceNotFound,
    DeviceInaccessible,
    CreateDeviceFailed,
    DriverNotInstalled,
    DriverWrongVersion,
    DriverInaccessible,
    AuxServiceInaccessible,
    FormatFailed,
    BadMountPoint,
    BadSyntax,
    OutOfMemory,
    PartitionNotFound,
    WrongSyntax,
    Fatal,
}

impl ErrorKind {
    /// Stable result code; success is `0`.
    pub const fn code(self) -> i32 {
        match self {
            ErrorKind::DeviceNotFound => 1,
            ErrorKind::DeviceInaccessible => 2,
            ErrorKind::CreateDeviceFailed => 3,
            ErrorKind::DriverNotInstalled => 4,
            ErrorKind::DriverWrongVersion => 5,
            ErrorKind::DriverInaccessible => 6,
            ErrorKind::AuxServiceInaccessible => 7,
            ErrorKind::FormatFailed => 8,
            ErrorKind::BadMountPoint => 9,
            ErrorKind::BadSyntax => 10,
            ErrorKind::OutOfMemory => 11,
            ErrorKind::PartitionNotFound => 12,
            ErrorKind::WrongSyntax => 13,
            ErrorKind::Fatal => -1,
        }
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct RamDiskError {
    kind: ErrorKind,
    message: String,
    os: Option<OsError>,
}

impl RamDiskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), os: None }
    }

    /// Failure caused by a system call; the OS text is appended to the message.
    pub fn os(kind: ErrorKind, message: impl Into<String>, source: OsError) -> Self {
        let message = format!("{}: {source}", message.into());
        Self { kind, message, os: Some(source) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn os_error(&self) -> Option<&OsError> {
        self.os.as_ref()
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.code()
    }
}

pub type Result<T, E = RamDiskError> = std::result::Result<T, E>;

/// Process exit code for an operation result.
pub fn exit_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}
