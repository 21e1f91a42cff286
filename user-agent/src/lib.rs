// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both binaries and
// integration tests.

#[macro_use]
mod macros;

pub mod comms;
pub mod config;
pub mod device;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod ramdisk;
pub mod settings;
pub mod sys;

pub use error::{ErrorKind, RamDiskError};
pub use ramdisk::{RamDisk, RamDiskOwner};
