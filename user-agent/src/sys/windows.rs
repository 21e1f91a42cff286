// src/sys/windows.rs

//! Win32 implementation of [`Platform`].
//!
//! Kernel object names (`\Device\...`) are opened through the
//! `\\.\GLOBALROOT` prefix so plain `CreateFileW` can reach them; every
//! other name is passed through unchanged. Services are started through
//! `windows-service`, the rest is raw `windows-sys`.

use std::{
    ffi::{OsStr, c_void},
    os::windows::{ffi::OsStrExt, process::CommandExt},
    path::Path,
    process::Command,
    ptr,
};

use windows_service::{
    service::ServiceAccess,
    service_manager::{ServiceManager, ServiceManagerAccess},
};
use windows_sys::Win32::{
    Foundation::{
        CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, HWND, INVALID_HANDLE_VALUE,
        WAIT_ABANDONED, WAIT_OBJECT_0,
    },
    Storage::FileSystem::{
        CreateFileW, DDD_EXACT_MATCH_ON_REMOVE, DDD_RAW_TARGET_PATH, DDD_REMOVE_DEFINITION,
        DefineDosDeviceW, FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT,
        FILE_READ_ATTRIBUTES, FILE_SHARE_READ, FILE_SHARE_WRITE, FlushFileBuffers,
        GetFullPathNameW, GetLogicalDrives, OPEN_EXISTING, QueryDosDeviceW,
    },
    System::{
        IO::DeviceIoControl,
        Pipes::WaitNamedPipeW,
        Threading::{CreateMutexW, INFINITE, ReleaseMutex, WaitForSingleObject},
    },
    UI::WindowsAndMessaging::{SMTO_ABORTIFHUNG, SMTO_BLOCK, SendMessageTimeoutW},
};

use super::{Access, DeviceHandle, NamedLock, OsError, Platform, codes, reparse};

// ───── constants windows-sys does not carry ─────────────────────────────────
const GLOBALROOT_PREFIX: &str = r"\\.\GLOBALROOT";

const FSCTL_SET_REPARSE_POINT: u32 = 0x0009_00A4;
const FSCTL_GET_REPARSE_POINT: u32 = 0x0009_00A8;
const FSCTL_DELETE_REPARSE_POINT: u32 = 0x0009_00AC;

const HWND_BROADCAST: HWND = 0xFFFF as HWND;
const WM_DEVICECHANGE: u32 = 0x0219;
const DBT_DEVICEQUERYREMOVE: usize = 0x8001;
const DBT_DEVICEREMOVEPENDING: usize = 0x8003;
const DBT_DEVTYP_VOLUME: u32 = 0x0002;
const BROADCAST_TIMEOUT_MS: u32 = 4_000;

const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// `DEV_BROADCAST_VOLUME` from `dbt.h`.
#[repr(C)]
struct DevBroadcastVolume {
    size: u32,
    device_type: u32,
    reserved: u32,
    unit_mask: u32,
    flags: u16,
}

/// NUL-terminated UTF-16 copy of `s` for Win32 calls.
fn wide(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(Some(0)).collect()
}

fn check(ok: i32) -> Result<(), OsError> {
    if ok == 0 { Err(OsError::last()) } else { Ok(()) }
}

// ───── handles ──────────────────────────────────────────────────────────────

/// Owned file/device handle, closed on drop.
struct Win32Handle(HANDLE);

// Handles are plain kernel references; nothing here is thread-affine.
unsafe impl Send for Win32Handle {}

impl Win32Handle {
    fn open(path: &[u16], access: u32, flags: u32) -> Result<Self, OsError> {
        let handle = unsafe {
            CreateFileW(
                path.as_ptr(),
                access,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null(),
                OPEN_EXISTING,
                flags,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(OsError::last());
        }
        Ok(Self(handle))
    }

    fn ioctl(&self, code: u32, input: &[u8], output: &mut [u8]) -> Result<usize, OsError> {
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                self.0,
                code,
                input.as_ptr().cast::<c_void>(),
                input.len() as u32,
                output.as_mut_ptr().cast::<c_void>(),
                output.len() as u32,
                &mut returned,
                ptr::null_mut(),
            )
        };
        check(ok)?;
        Ok(returned as usize)
    }
}

impl DeviceHandle for Win32Handle {
    fn control(&mut self, code: u32, input: &[u8], output: &mut [u8]) -> Result<usize, OsError> {
        self.ioctl(code, input, output)
    }

    fn flush(&mut self) -> Result<(), OsError> {
        check(unsafe { FlushFileBuffers(self.0) })
    }
}

impl Drop for Win32Handle {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

/// Named mutex held by this process.
struct Win32Mutex {
    handle: HANDLE,
    held: bool,
}

unsafe impl Send for Win32Mutex {}

impl NamedLock for Win32Mutex {
    fn release(mut self: Box<Self>) -> Result<(), OsError> {
        self.held = false;
        check(unsafe { ReleaseMutex(self.handle) })
    }
}

impl Drop for Win32Mutex {
    fn drop(&mut self) {
        unsafe {
            if self.held {
                ReleaseMutex(self.handle);
            }
            CloseHandle(self.handle);
        }
    }
}

// ───── platform ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Win32Platform;

impl Win32Platform {
    pub fn new() -> Self {
        Self
    }

    fn open_reparse_dir(dir: &Path, access: u32) -> Result<Win32Handle, OsError> {
        Win32Handle::open(
            &wide(dir),
            access,
            FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
        )
    }
}

fn desired_access(access: Access) -> u32 {
    match access {
        Access::ReadWrite => GENERIC_READ | GENERIC_WRITE,
        Access::Read => GENERIC_READ,
        Access::Attributes => FILE_READ_ATTRIBUTES,
    }
}

fn win32_name(name: &str) -> String {
    if name.starts_with(r"\Device\") {
        format!("{GLOBALROOT_PREFIX}{name}")
    } else {
        name.to_string()
    }
}

impl Platform for Win32Platform {
    fn open_device(&self, name: &str, access: Access) -> Result<Box<dyn DeviceHandle>, OsError> {
        let handle = Win32Handle::open(&wide(win32_name(name)), desired_access(access), 0)?;
        Ok(Box::new(handle))
    }

    fn start_service(&self, service: &str) -> Result<(), OsError> {
        let to_os = |e: windows_service::Error| match e {
            windows_service::Error::Winapi(io) => OsError::from(io),
            other => OsError::with_message(codes::ERROR_GEN_FAILURE, other.to_string()),
        };
        let manager =
            ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT).map_err(to_os)?;
        let svc = manager.open_service(service, ServiceAccess::START).map_err(to_os)?;
        svc.start::<&OsStr>(&[]).map_err(to_os)
    }

    fn probe_pipe(&self, pipe: &str) -> Result<(), OsError> {
        check(unsafe { WaitNamedPipeW(wide(pipe).as_ptr(), 0) })
    }

    fn probe_global_namespace(&self) -> Result<(), OsError> {
        self.query_dos_device("Global").map(|_| ())
    }

    fn full_path(&self, path: &str) -> Result<String, OsError> {
        let name = wide(path);
        let mut buf = vec![0u16; 32_768];
        let len = unsafe {
            GetFullPathNameW(name.as_ptr(), buf.len() as u32, buf.as_mut_ptr(), ptr::null_mut())
        } as usize;
        if len == 0 || len >= buf.len() {
            return Err(OsError::last());
        }
        String::from_utf16(&buf[..len]).map_err(|_| OsError::new(codes::ERROR_INVALID_PARAMETER))
    }

    fn query_dos_device(&self, name: &str) -> Result<String, OsError> {
        let mut buf = vec![0u16; 32_768];
        let len = unsafe { QueryDosDeviceW(wide(name).as_ptr(), buf.as_mut_ptr(), buf.len() as u32) };
        if len == 0 {
            return Err(OsError::last());
        }
        let first = buf.split(|&u| u == 0).next().unwrap_or(&[]);
        String::from_utf16(first).map_err(|_| OsError::new(codes::ERROR_INVALID_PARAMETER))
    }

    fn define_dos_device(&self, name: &str, target: &str) -> Result<(), OsError> {
        check(unsafe { DefineDosDeviceW(DDD_RAW_TARGET_PATH, wide(name).as_ptr(), wide(target).as_ptr()) })
    }

    fn remove_dos_device(&self, name: &str, target: Option<&str>) -> Result<(), OsError> {
        let name = wide(name);
        let ok = match target {
            Some(target) => unsafe {
                DefineDosDeviceW(
                    DDD_RAW_TARGET_PATH | DDD_REMOVE_DEFINITION | DDD_EXACT_MATCH_ON_REMOVE,
                    name.as_ptr(),
                    wide(target).as_ptr(),
                )
            },
            None => unsafe { DefineDosDeviceW(DDD_REMOVE_DEFINITION, name.as_ptr(), ptr::null()) },
        };
        check(ok)
    }

    fn logical_drives(&self) -> u32 {
        unsafe { GetLogicalDrives() }
    }

    fn notify_remove_pending(&self, letter: char) {
        let index = (letter.to_ascii_uppercase() as u32).wrapping_sub('A' as u32);
        if index >= 26 {
            return;
        }
        let mut volume = DevBroadcastVolume {
            size: size_of::<DevBroadcastVolume>() as u32,
            device_type: DBT_DEVTYP_VOLUME,
            reserved: 0,
            unit_mask: 1 << index,
            flags: 0,
        };
        for event in [DBT_DEVICEQUERYREMOVE, DBT_DEVICEREMOVEPENDING] {
            let mut result = 0usize;
            unsafe {
                SendMessageTimeoutW(
                    HWND_BROADCAST,
                    WM_DEVICECHANGE,
                    event,
                    ptr::addr_of_mut!(volume) as isize,
                    SMTO_BLOCK | SMTO_ABORTIFHUNG,
                    BROADCAST_TIMEOUT_MS,
                    &mut result,
                )
            };
        }
    }

    fn supports_directory_mount_points(&self) -> bool {
        // every NT release this builds for has volume mount points
        true
    }

    fn create_mount_point(&self, dir: &Path, target: &str) -> Result<(), OsError> {
        let data = reparse::encode_mount_point(target)?;
        let handle = Self::open_reparse_dir(dir, GENERIC_READ | GENERIC_WRITE)?;
        handle.ioctl(FSCTL_SET_REPARSE_POINT, &data, &mut []).map(|_| ())
    }

    fn remove_mount_point(&self, dir: &Path) -> Result<(), OsError> {
        let handle = Self::open_reparse_dir(dir, GENERIC_READ | GENERIC_WRITE)?;
        handle.ioctl(FSCTL_DELETE_REPARSE_POINT, &reparse::delete_header(), &mut []).map(|_| ())
    }

    fn query_mount_point(&self, dir: &Path) -> Result<String, OsError> {
        let handle = Self::open_reparse_dir(dir, GENERIC_READ)?;
        let mut buf = vec![0u8; reparse::MAXIMUM_REPARSE_DATA_BUFFER_SIZE];
        let len = handle.ioctl(FSCTL_GET_REPARSE_POINT, &[], &mut buf)?;
        reparse::decode_mount_point(&buf[..len])
    }

    fn open_mount_point(&self, dir: &Path, access: Access) -> Result<Box<dyn DeviceHandle>, OsError> {
        let target = self.query_mount_point(dir)?;
        self.open_device(&target, access)
    }

    fn acquire_named_lock(&self, name: &str) -> Result<Box<dyn NamedLock>, OsError> {
        let handle = unsafe { CreateMutexW(ptr::null(), 0, wide(name).as_ptr()) };
        if handle.is_null() {
            return Err(OsError::last());
        }
        let mut lock = Win32Mutex { handle, held: false };
        match unsafe { WaitForSingleObject(handle, INFINITE) } {
            WAIT_OBJECT_0 | WAIT_ABANDONED => {
                lock.held = true;
                Ok(Box::new(lock))
            }
            _ => Err(OsError::last()),
        }
    }

    fn run_process(&self, program: &Path, args: &[String]) -> Result<i32, OsError> {
        let status = Command::new(program)
            .args(args)
            .creation_flags(CREATE_NO_WINDOW)
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }
}
