//! Communication with the ImDisk driver and its helper services.

pub mod channel;
pub mod ioctl;

pub use channel::{DriverChannel, DriverSession, ServiceError};
