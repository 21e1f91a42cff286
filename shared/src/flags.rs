//! Device flag word carried in every creation record.
//!
//! The driver packs four independent fields into one `u32`:
//!
//!   ┌ 0xF000 ┬ 0x0F00 ─┬ 0x00F0 ──┬ 0x000F ─────────────┐
//!   │ sub    │ backing │ device   │ read-only/removable │
//!   └────────┴─────────┴──────────┴─────────────────────┘
//!
//! The sub-type nibble is read as a proxy type for proxy disks and as a file
//! type for everything else.

pub const READ_ONLY: u32 = 0x0000_0001;
pub const REMOVABLE: u32 = 0x0000_0002;

const DEVICE_TYPE_MASK: u32 = 0x0000_00F0;
const BACKING_TYPE_MASK: u32 = 0x0000_0F00;
const SUB_TYPE_MASK: u32 = 0x0000_F000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Unset = 0x00,
    HardDisk = 0x10,
    Floppy = 0x20,
    CdRom = 0x30,
    Raw = 0x40,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingType {
    Unset = 0x000,
    File = 0x100,
    VirtualMemory = 0x200,
    Proxy = 0x300,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyType {
    Direct = 0x0000,
    Comm = 0x1000,
    Tcp = 0x2000,
    SharedMemory = 0x3000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    QueuedIo = 0x0000,
    AweAlloc = 0x1000,
    ParallelIo = 0x2000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DeviceFlags(u32);

impl DeviceFlags {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn with_device_type(self, ty: DeviceType) -> Self {
        Self((self.0 & !DEVICE_TYPE_MASK) | ty as u32)
    }

    pub fn with_backing(self, ty: BackingType) -> Self {
        Self((self.0 & !BACKING_TYPE_MASK) | ty as u32)
    }

    pub fn with_proxy_type(self, ty: ProxyType) -> Self {
        Self((self.0 & !SUB_TYPE_MASK) | ty as u32)
    }

    pub fn with_file_type(self, ty: FileType) -> Self {
        Self((self.0 & !SUB_TYPE_MASK) | ty as u32)
    }

    pub fn with_read_only(self, on: bool) -> Self {
        self.toggle(READ_ONLY, on)
    }

    pub fn with_removable(self, on: bool) -> Self {
        self.toggle(REMOVABLE, on)
    }

    fn toggle(self, bit: u32, on: bool) -> Self {
        if on { Self(self.0 | bit) } else { Self(self.0 & !bit) }
    }

    pub fn is_read_only(self) -> bool {
        self.0 & READ_ONLY != 0
    }

    pub fn is_removable(self) -> bool {
        self.0 & REMOVABLE != 0
    }

    /// `None` when the nibble holds a value this crate does not know.
    pub fn device_type(self) -> Option<DeviceType> {
        match self.0 & DEVICE_TYPE_MASK {
            0x00 => Some(DeviceType::Unset),
            0x10 => Some(DeviceType::HardDisk),
            0x20 => Some(DeviceType::Floppy),
            0x30 => Some(DeviceType::CdRom),
            0x40 => Some(DeviceType::Raw),
            _ => None,
        }
    }

    pub fn backing(self) -> Option<BackingType> {
        match self.0 & BACKING_TYPE_MASK {
            0x000 => Some(BackingType::Unset),
            0x100 => Some(BackingType::File),
            0x200 => Some(BackingType::VirtualMemory),
            0x300 => Some(BackingType::Proxy),
            _ => None,
        }
    }

    /// Only meaningful for proxy-backed disks.
    pub fn proxy_type(self) -> Option<ProxyType> {
        if self.backing() != Some(BackingType::Proxy) {
            return None;
        }
        match self.0 & SUB_TYPE_MASK {
            0x0000 => Some(ProxyType::Direct),
            0x1000 => Some(ProxyType::Comm),
            0x2000 => Some(ProxyType::Tcp),
            0x3000 => Some(ProxyType::SharedMemory),
            _ => None,
        }
    }

    /// Only meaningful for file-backed disks (an unset backing type counts as file).
    pub fn file_type(self) -> Option<FileType> {
        if !matches!(self.backing(), Some(BackingType::File | BackingType::Unset)) {
            return None;
        }
        match self.0 & SUB_TYPE_MASK {
            0x0000 => Some(FileType::QueuedIo),
            0x1000 => Some(FileType::AweAlloc),
            0x2000 => Some(FileType::ParallelIo),
            _ => None,
        }
    }

    /// Physical memory disks need the AWEAlloc driver loaded next to ImDisk.
    pub fn needs_awealloc(self) -> bool {
        self.file_type() == Some(FileType::AweAlloc)
    }

    /// Reconnecting proxy types are served by the user-mode helper service.
    pub fn needs_proxy_service(self) -> bool {
        matches!(self.proxy_type(), Some(ProxyType::Tcp | ProxyType::Comm))
    }

    pub fn is_shared_memory_proxy(self) -> bool {
        self.proxy_type() == Some(ProxyType::SharedMemory)
    }
}

impl From<u32> for DeviceFlags {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}
