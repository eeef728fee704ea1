//! Protocol implementations.

pub mod crc;
pub mod frame;

// Re-export common types
pub use crc::crc16;
pub use frame::{FRAME_BOUNDARY, MAX_PAYLOAD_LEN, decode, encode};
