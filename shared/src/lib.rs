//! Driver-facing protocol shared by the RAM disk agent and its tools:
//! object names, control codes, flag words and the creation record.

pub mod constants;
pub mod create_data;
pub mod flags;

pub use create_data::{CreateData, DiskGeometry, ProtocolError};
pub use flags::DeviceFlags;
