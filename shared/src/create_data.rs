//! `IMDISK_CREATE_DATA` codec.
//!
//! Layout (little endian, natural alignment of the C struct):
//!
//!   off  size  field
//!    0    4    device_number
//!    8   24    geometry { cylinders i64, media_type, tracks/cyl, sectors/track, bytes/sector }
//!   32    8    image_offset
//!   40    4    flags
//!   44    2    drive_letter (UTF-16 code unit, 0 = none)
//!   46    2    file_name_length (bytes)
//!   48    …    file_name (UTF-16LE, not terminated)
//!
//! `sizeof(IMDISK_CREATE_DATA)` is 56 because of the trailing one-character
//! array and 8-byte alignment; requests are sent as `56 + file_name_length`
//! bytes like the reference tools do.

use thiserror::Error;

use crate::constants::IMDISK_AUTO_DEVICE_NUMBER;
use crate::flags::DeviceFlags;

pub const FILE_NAME_OFFSET: usize = 48;
pub const CREATE_DATA_SIZE: usize = 56;

/// Reply buffer large enough for a record with a `MAX_PATH`-sized name.
pub const QUERY_REPLY_CAPACITY: usize = CREATE_DATA_SIZE + (260 << 2);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("record truncated: {len} bytes, need at least {need}")]
    Truncated { len: usize, need: usize },

    #[error("file name is {0} bytes, limit is 65535")]
    FileNameTooLong(usize),

    #[error("drive letter code unit {0:#06x} is not a character")]
    InvalidDriveLetter(u16),

    #[error("file name is not valid UTF-16")]
    InvalidFileName,
}

/// `DISK_GEOMETRY`. With every field except `cylinders` left at zero the
/// driver reads `cylinders` as the disk size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskGeometry {
    pub cylinders: i64,
    pub media_type: u32,
    pub tracks_per_cylinder: u32,
    pub sectors_per_track: u32,
    pub bytes_per_sector: u32,
}

impl DiskGeometry {
    pub fn sized(bytes: u64) -> Self {
        Self { cylinders: bytes as i64, ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateData {
    pub device_number: u32,
    pub geometry: DiskGeometry,
    pub image_offset: i64,
    pub flags: DeviceFlags,
    pub drive_letter: Option<char>,
    pub file_name: String,
}

impl Default for CreateData {
    fn default() -> Self {
        Self {
            device_number: IMDISK_AUTO_DEVICE_NUMBER,
            geometry: DiskGeometry::default(),
            image_offset: 0,
            flags: DeviceFlags::default(),
            drive_letter: None,
            file_name: String::new(),
        }
    }
}

impl CreateData {
    /// Serialise into a request buffer (also used as the reply buffer).
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let name: Vec<u16> = self.file_name.encode_utf16().collect();
        let name_len = name.len() * 2;
        if name_len > u16::MAX as usize {
            return Err(ProtocolError::FileNameTooLong(name_len));
        }

        let mut buf = vec![0u8; CREATE_DATA_SIZE + name_len];
        put(&mut buf, 0, &self.device_number.to_le_bytes());
        put(&mut buf, 8, &self.geometry.cylinders.to_le_bytes());
        put(&mut buf, 16, &self.geometry.media_type.to_le_bytes());
        put(&mut buf, 20, &self.geometry.tracks_per_cylinder.to_le_bytes());
        put(&mut buf, 24, &self.geometry.sectors_per_track.to_le_bytes());
        put(&mut buf, 28, &self.geometry.bytes_per_sector.to_le_bytes());
        put(&mut buf, 32, &self.image_offset.to_le_bytes());
        put(&mut buf, 40, &self.flags.bits().to_le_bytes());
        let letter = self.drive_letter.map_or(0u16, |c| c as u16);
        put(&mut buf, 44, &letter.to_le_bytes());
        put(&mut buf, 46, &(name_len as u16).to_le_bytes());
        for (i, unit) in name.iter().enumerate() {
            put(&mut buf, FILE_NAME_OFFSET + i * 2, &unit.to_le_bytes());
        }
        Ok(buf)
    }

    /// Parse a driver reply. Anything shorter than the fixed header is not a
    /// creation record at all.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < FILE_NAME_OFFSET {
            return Err(ProtocolError::Truncated { len: buf.len(), need: FILE_NAME_OFFSET });
        }

        let name_len = u16_at(buf, 46) as usize;
        if name_len % 2 != 0 {
            return Err(ProtocolError::InvalidFileName);
        }
        let name_end = FILE_NAME_OFFSET + name_len;
        if buf.len() < name_end {
            return Err(ProtocolError::Truncated { len: buf.len(), need: name_end });
        }
        let units: Vec<u16> = buf[FILE_NAME_OFFSET..name_end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let file_name = String::from_utf16(&units).map_err(|_| ProtocolError::InvalidFileName)?;

        let letter = u16_at(buf, 44);
        let drive_letter = match letter {
            0 => None,
            unit => Some(char::from_u32(unit as u32).ok_or(ProtocolError::InvalidDriveLetter(unit))?),
        };

        Ok(Self {
            device_number: u32_at(buf, 0),
            geometry: DiskGeometry {
                cylinders: i64_at(buf, 8),
                media_type: u32_at(buf, 16),
                tracks_per_cylinder: u32_at(buf, 20),
                sectors_per_track: u32_at(buf, 24),
                bytes_per_sector: u32_at(buf, 28),
            },
            image_offset: i64_at(buf, 32),
            flags: DeviceFlags::from_bits(u32_at(buf, 40)),
            drive_letter,
            file_name,
        })
    }
}

/*────────── byte helpers ─────────*/

fn put(buf: &mut [u8], off: usize, bytes: &[u8]) {
    buf[off..off + bytes.len()].copy_from_slice(bytes);
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

fn i64_at(buf: &[u8], off: usize) -> i64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    i64::from_le_bytes(b)
}
