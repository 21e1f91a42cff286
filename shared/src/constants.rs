//! Object names, protocol version and control codes understood by the
//! ImDisk virtual disk driver and its helper services.

/*────────── object & service names ─────────*/

pub const IMDISK_CTL_DEVICE_NAME: &str = r"\Device\ImDiskCtl";
pub const IMDISK_DEVICE_BASE_NAME: &str = r"\Device\ImDisk";
pub const IMDISK_DRIVER_NAME: &str = "ImDisk";

/// Kernel-side physical memory allocator used by AWEAlloc-backed disks.
pub const AWEALLOC_DRIVER_NAME: &str = "AWEAlloc";
pub const AWEALLOC_DEVICE_NAME: &str = r"\Device\AWEAlloc";

/// User-mode helper service relaying TCP / comm-port proxy disks.
pub const IMDPROXY_SVC: &str = "ImDskSvc";
pub const IMDPROXY_SVC_PIPE_DOSDEV_NAME: &str = r"\\.\PIPE\ImDskSvc";

/// Object namespace prefixes for shared-memory proxy backing objects.
pub const GLOBAL_OBJECTS_PREFIX: &str = r"\BaseNamedObjects\Global\";
pub const LOCAL_OBJECTS_PREFIX: &str = r"\BaseNamedObjects\";

/*────────── protocol ─────────*/

/// Version reported by `IOCTL_IMDISK_QUERY_VERSION`; anything else is rejected.
pub const IMDISK_DRIVER_VERSION: u32 = 0x0103;

/// Device number sentinel asking the driver to pick a free number.
pub const IMDISK_AUTO_DEVICE_NUMBER: u32 = u32::MAX;

/*────────── control codes ─────────*/

const METHOD_BUFFERED: u32 = 0;
const FILE_ANY_ACCESS: u32 = 0;
const FILE_READ_ACCESS: u32 = 1;
const FILE_WRITE_ACCESS: u32 = 2;

const FILE_DEVICE_FILE_SYSTEM: u32 = 0x0009;
const IOCTL_STORAGE_BASE: u32 = 0x002d;
pub const FILE_DEVICE_IMDISK: u32 = 0x8372;

/// Rust equivalent of the Windows `CTL_CODE` macro.
pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

pub const IOCTL_IMDISK_QUERY_VERSION: u32 =
    ctl_code(FILE_DEVICE_IMDISK, 0x800, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_IMDISK_CREATE_DEVICE: u32 = ctl_code(
    FILE_DEVICE_IMDISK,
    0x801,
    METHOD_BUFFERED,
    FILE_READ_ACCESS | FILE_WRITE_ACCESS,
);
pub const IOCTL_IMDISK_QUERY_DEVICE: u32 =
    ctl_code(FILE_DEVICE_IMDISK, 0x802, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_IMDISK_REMOVE_DEVICE: u32 = ctl_code(
    FILE_DEVICE_IMDISK,
    0x806,
    METHOD_BUFFERED,
    FILE_READ_ACCESS | FILE_WRITE_ACCESS,
);

pub const FSCTL_LOCK_VOLUME: u32 = ctl_code(FILE_DEVICE_FILE_SYSTEM, 6, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const FSCTL_UNLOCK_VOLUME: u32 = ctl_code(FILE_DEVICE_FILE_SYSTEM, 7, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const FSCTL_DISMOUNT_VOLUME: u32 = ctl_code(FILE_DEVICE_FILE_SYSTEM, 8, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_STORAGE_EJECT_MEDIA: u32 =
    ctl_code(IOCTL_STORAGE_BASE, 0x0202, METHOD_BUFFERED, FILE_READ_ACCESS);

/// Kernel object path of device `number`, e.g. `\Device\ImDisk2`.
pub fn device_path(number: u32) -> String {
    format!("{IMDISK_DEVICE_BASE_NAME}{number}")
}

/// Inverse of [`device_path`].
pub fn device_number_from_path(path: &str) -> Option<u32> {
    path.strip_prefix(IMDISK_DEVICE_BASE_NAME)?
        .trim_end_matches('\\')
        .parse()
        .ok()
}
