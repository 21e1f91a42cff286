//! IOCTL communication interface with the ImDisk driver.
//!
//! This module wraps the raw control requests the lifecycle code sends over
//! a [`DeviceHandle`], marshalling the shared-crate records in and out.
//!
//! Key responsibilities:
//! - Encode creation records and decode the driver's replies.
//! - Query the protocol version without judging it (see `channel`).
//! - Issue the volume requests used during teardown.

use shared::constants::{
    FSCTL_DISMOUNT_VOLUME, FSCTL_LOCK_VOLUME, FSCTL_UNLOCK_VOLUME, IOCTL_IMDISK_CREATE_DEVICE,
    IOCTL_IMDISK_QUERY_DEVICE, IOCTL_IMDISK_QUERY_VERSION, IOCTL_IMDISK_REMOVE_DEVICE,
    IOCTL_STORAGE_EJECT_MEDIA,
};
use shared::create_data::QUERY_REPLY_CAPACITY;
use shared::{CreateData, ProtocolError};
use thiserror::Error;

use crate::sys::{DeviceHandle, OsError};

#[derive(Debug, Error)]
pub enum IoctlError {
    #[error(transparent)]
    Os(#[from] OsError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Version word reported by the driver; `None` when the reply is too short
/// to carry one.
pub fn query_version(handle: &mut dyn DeviceHandle) -> Result<Option<u32>, OsError> {
    let mut out = [0u8; 4];
    let n = handle.control(IOCTL_IMDISK_QUERY_VERSION, &[], &mut out)?;
    if n < out.len() {
        return Ok(None);
    }
    Ok(Some(u32::from_le_bytes(out)))
}

/// Send a creation record on the control device. The driver rewrites the
/// record in place; the returned copy carries the assigned device number and
/// the drive letter it actually bound.
pub fn create_device(ctl: &mut dyn DeviceHandle, data: &CreateData) -> Result<CreateData, IoctlError> {
    let request = data.encode()?;
    let mut reply = request.clone();
    ctl.control(IOCTL_IMDISK_CREATE_DEVICE, &request, &mut reply)?;
    Ok(CreateData::decode(&reply)?)
}

/// Parameters of the device behind `device`. A reply shorter than the fixed
/// record header surfaces as [`ProtocolError::Truncated`].
pub fn query_device(device: &mut dyn DeviceHandle) -> Result<CreateData, IoctlError> {
    let mut reply = vec![0u8; QUERY_REPLY_CAPACITY];
    let n = device.control(IOCTL_IMDISK_QUERY_DEVICE, &[], &mut reply)?;
    Ok(CreateData::decode(&reply[..n.min(reply.len())])?)
}

/// Ask the driver to drop device `number` regardless of open handles.
pub fn remove_device(ctl: &mut dyn DeviceHandle, number: u32) -> Result<(), OsError> {
    ctl.control(IOCTL_IMDISK_REMOVE_DEVICE, &number.to_le_bytes(), &mut [])
        .map(|_| ())
}

pub fn lock_volume(device: &mut dyn DeviceHandle) -> Result<(), OsError> {
    device.control(FSCTL_LOCK_VOLUME, &[], &mut []).map(|_| ())
}

pub fn unlock_volume(device: &mut dyn DeviceHandle) -> Result<(), OsError> {
    device.control(FSCTL_UNLOCK_VOLUME, &[], &mut []).map(|_| ())
}

pub fn dismount_volume(device: &mut dyn DeviceHandle) -> Result<(), OsError> {
    device.control(FSCTL_DISMOUNT_VOLUME, &[], &mut []).map(|_| ())
}

pub fn eject_media(device: &mut dyn DeviceHandle) -> Result<(), OsError> {
    device.control(IOCTL_STORAGE_EJECT_MEDIA, &[], &mut []).map(|_| ())
}
