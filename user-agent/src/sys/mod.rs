// src/sys/mod.rs

//! Operating-system seam.
//!
//! Everything the lifecycle code needs from Windows goes through the
//! [`Platform`] trait so the handshake logic can run against an in-memory
//! fake in tests.
//!
//! Key responsibilities:
//! - Model Win32 failures as [`OsError`] (raw code + system text).
//! - Hand out device handles and named locks as RAII trait objects.
//! - Provide the ordered-fallback helper used by every retry chain.

pub mod reparse;
#[cfg(windows)]
pub mod windows;

use std::{fmt, io, path::Path, sync::Arc, time::Duration};

/// Win32 error codes the lifecycle code classifies.
pub mod codes {
    pub const ERROR_INVALID_FUNCTION: u32 = 1;
    pub const ERROR_FILE_NOT_FOUND: u32 = 2;
    pub const ERROR_PATH_NOT_FOUND: u32 = 3;
    pub const ERROR_ACCESS_DENIED: u32 = 5;
    pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
    pub const ERROR_GEN_FAILURE: u32 = 31;
    pub const ERROR_NOT_SUPPORTED: u32 = 50;
    pub const ERROR_INVALID_PARAMETER: u32 = 87;
    pub const ERROR_SEM_TIMEOUT: u32 = 121;
    pub const ERROR_DIR_NOT_EMPTY: u32 = 145;
    pub const ERROR_ALREADY_EXISTS: u32 = 183;
    pub const ERROR_DIRECTORY: u32 = 267;
    pub const ERROR_SERVICE_ALREADY_RUNNING: u32 = 1056;
    pub const ERROR_SERVICE_DISABLED: u32 = 1058;
    pub const ERROR_SERVICE_DOES_NOT_EXIST: u32 = 1060;
    pub const ERROR_NOT_A_REPARSE_POINT: u32 = 4390;
    pub const ERROR_INVALID_REPARSE_DATA: u32 = 4392;
}

/// A failed system call: the raw Win32 code plus the text the OS gives for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsError {
    code: u32,
    message: String,
}

impl OsError {
    /// Error for `code` with the system-supplied description.
    pub fn new(code: u32) -> Self {
        Self { code, message: os_text(&io::Error::from_raw_os_error(code as i32)) }
    }

    pub fn with_message(code: u32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Capture the calling thread's last OS error.
    pub fn last() -> Self {
        io::Error::last_os_error().into()
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, code: u32) -> bool {
        self.code == code
    }

    pub fn is_not_found(&self) -> bool {
        self.code == codes::ERROR_FILE_NOT_FOUND
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (os error {})", self.message.trim_end(), self.code)
    }
}

impl std::error::Error for OsError {}

impl From<io::Error> for OsError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Self { code: code as u32, message: os_text(&err) },
            None => Self { code: codes::ERROR_GEN_FAILURE, message: err.to_string() },
        }
    }
}

/// System text without the ` (os error N)` suffix `io::Error` appends.
fn os_text(err: &io::Error) -> String {
    let text = err.to_string();
    match text.rfind(" (os error ") {
        Some(end) => text[..end].to_string(),
        None => text,
    }
}

/// Access requested when opening a device, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    Read,
    Attributes,
}

/// Degraded-access order used to reach an existing device.
pub const ACCESS_FALLBACK: [Access; 3] = [Access::ReadWrite, Access::Read, Access::Attributes];

/// An open handle to the control device or a disk device. Dropping it closes
/// the underlying OS handle.
pub trait DeviceHandle: Send {
    /// `DeviceIoControl`: returns the number of bytes written to `output`.
    fn control(&mut self, code: u32, input: &[u8], output: &mut [u8]) -> Result<usize, OsError>;

    fn flush(&mut self) -> Result<(), OsError>;
}

/// Ownership of a system-wide named lock.
pub trait NamedLock: Send {
    /// Give the lock back. Implementations also release on drop if this was
    /// never called.
    fn release(self: Box<Self>) -> Result<(), OsError>;
}

pub trait Platform: Send + Sync {
    // ───── devices ──────────────────────────────────────────────────────────

    /// Open a kernel object path (`\Device\ImDisk0`) or a Win32 device path
    /// (`\\.\R:`).
    fn open_device(&self, name: &str, access: Access) -> Result<Box<dyn DeviceHandle>, OsError>;

    // ───── services & namespaces ────────────────────────────────────────────

    /// Start a driver or service. `ERROR_SERVICE_ALREADY_RUNNING` is reported
    /// as an error like any other code.
    fn start_service(&self, service: &str) -> Result<(), OsError>;

    /// Zero-timeout probe for a named pipe endpoint.
    fn probe_pipe(&self, pipe: &str) -> Result<(), OsError>;

    /// Succeeds when the `Global` object namespace is reachable from this session.
    fn probe_global_namespace(&self) -> Result<(), OsError>;

    /// Absolute form of a user supplied path.
    fn full_path(&self, path: &str) -> Result<String, OsError>;

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }

    // ───── drive letters ────────────────────────────────────────────────────

    /// First target of a DOS device name such as `R:`.
    fn query_dos_device(&self, name: &str) -> Result<String, OsError>;

    fn define_dos_device(&self, name: &str, target: &str) -> Result<(), OsError>;

    /// Remove a DOS device definition; with `target` only an exact match is removed.
    fn remove_dos_device(&self, name: &str, target: Option<&str>) -> Result<(), OsError>;

    /// Bit mask of drive letters in use, bit 0 = `A:`.
    fn logical_drives(&self) -> u32;

    /// Tell running applications the volume on `letter` is about to go away.
    fn notify_remove_pending(&self, letter: char);

    // ───── directory mount points ───────────────────────────────────────────

    fn supports_directory_mount_points(&self) -> bool;

    fn create_mount_point(&self, dir: &Path, target: &str) -> Result<(), OsError>;

    fn remove_mount_point(&self, dir: &Path) -> Result<(), OsError>;

    /// Kernel path the directory's mount point reparse data refers to.
    fn query_mount_point(&self, dir: &Path) -> Result<String, OsError>;

    /// Open the device a directory mount point refers to.
    fn open_mount_point(&self, dir: &Path, access: Access) -> Result<Box<dyn DeviceHandle>, OsError>;

    // ───── locks & processes ────────────────────────────────────────────────

    /// Create or open the named lock and wait for it without a timeout. An
    /// abandoned lock counts as acquired.
    fn acquire_named_lock(&self, name: &str) -> Result<Box<dyn NamedLock>, OsError>;

    /// Run `program` without a console window and wait for it; returns the exit code.
    fn run_process(&self, program: &Path, args: &[String]) -> Result<i32, OsError>;
}

/// Try each step in order and return the first success. When every step
/// fails the error of the last one is returned.
pub fn first_success<S, T, F>(steps: impl IntoIterator<Item = S>, mut attempt: F) -> Result<T, OsError>
where
    F: FnMut(S) -> Result<T, OsError>,
{
    let mut last = OsError::new(codes::ERROR_INVALID_PARAMETER);
    for step in steps {
        match attempt(step) {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::trace!("fallback step failed: {e}");
                last = e;
            }
        }
    }
    Err(last)
}

/// The platform of the running system, when this build has one.
pub fn native() -> Option<Arc<dyn Platform>> {
    #[cfg(windows)]
    {
        Some(Arc::new(windows::Win32Platform::new()))
    }
    #[cfg(not(windows))]
    {
        None
    }
}
