// src/sys/reparse.rs

//! Mount point reparse buffers.
//!
//! A directory mount point is an NTFS reparse point whose data names the
//! volume device. Only the mount point flavour of `REPARSE_DATA_BUFFER` is
//! handled here:
//!
//!   off  size  field
//!    0    4    reparse tag (IO_REPARSE_TAG_MOUNT_POINT)
//!    4    2    reparse data length (bytes after offset 8)
//!    6    2    reserved
//!    8    2    substitute name offset   ┐
//!   10    2    substitute name length   │ relative to the path buffer
//!   12    2    print name offset        │
//!   14    2    print name length        ┘
//!   16    …    path buffer (UTF-16LE, each name NUL terminated)

use super::{OsError, codes};

pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;

const HEADER_SIZE: usize = 8;
const PATH_BUFFER_OFFSET: usize = 16;

/// Largest buffer `FSCTL_GET_REPARSE_POINT` can return.
pub const MAXIMUM_REPARSE_DATA_BUFFER_SIZE: usize = 16 * 1024;

/// Build the `FSCTL_SET_REPARSE_POINT` input that points a directory at the
/// kernel device `target` (e.g. `\Device\ImDisk0`).
pub fn encode_mount_point(target: &str) -> Result<Vec<u8>, OsError> {
    let mut substitute: Vec<u16> = target.encode_utf16().collect();
    if substitute.last() != Some(&(b'\\' as u16)) {
        substitute.push(b'\\' as u16);
    }
    let name_len = substitute.len() * 2;

    // names + two NUL terminators + the four offset/length words
    let data_len = 8 + name_len + 2 + 2;
    if PATH_BUFFER_OFFSET + name_len + 4 > MAXIMUM_REPARSE_DATA_BUFFER_SIZE {
        return Err(OsError::new(codes::ERROR_INVALID_REPARSE_DATA));
    }

    let mut buf = vec![0u8; HEADER_SIZE + data_len];
    buf[0..4].copy_from_slice(&IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
    buf[4..6].copy_from_slice(&(data_len as u16).to_le_bytes());
    buf[8..10].copy_from_slice(&0u16.to_le_bytes());
    buf[10..12].copy_from_slice(&(name_len as u16).to_le_bytes());
    buf[12..14].copy_from_slice(&((name_len + 2) as u16).to_le_bytes());
    buf[14..16].copy_from_slice(&0u16.to_le_bytes());
    for (i, unit) in substitute.iter().enumerate() {
        let off = PATH_BUFFER_OFFSET + i * 2;
        buf[off..off + 2].copy_from_slice(&unit.to_le_bytes());
    }
    Ok(buf)
}

/// `FSCTL_DELETE_REPARSE_POINT` input: the bare header with no data.
pub fn delete_header() -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
    buf
}

/// Device path a mount point reparse buffer refers to, without the trailing
/// backslash.
pub fn decode_mount_point(buf: &[u8]) -> Result<String, OsError> {
    if buf.len() < PATH_BUFFER_OFFSET {
        return Err(OsError::new(codes::ERROR_INVALID_REPARSE_DATA));
    }
    let tag = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if tag != IO_REPARSE_TAG_MOUNT_POINT {
        return Err(OsError::new(codes::ERROR_NOT_A_REPARSE_POINT));
    }

    let word = |off: usize| u16::from_le_bytes([buf[off], buf[off + 1]]) as usize;
    let start = PATH_BUFFER_OFFSET + word(8);
    let end = start + word(10);
    if end > buf.len() || (end - start) % 2 != 0 {
        return Err(OsError::new(codes::ERROR_INVALID_REPARSE_DATA));
    }

    let units: Vec<u16> = buf[start..end]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let name = String::from_utf16(&units).map_err(|_| OsError::new(codes::ERROR_INVALID_REPARSE_DATA))?;
    Ok(name.trim_end_matches('\\').to_string())
}
