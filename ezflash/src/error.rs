//! Error types for ezflash.

use std::io;
use thiserror::Error;

use crate::target::ez430::SessionState;

/// Result type for ezflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ezflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Received frame failed its CRC check.
    #[error("CRC mismatch: frame carries {expected:#06x}, computed {actual:#06x}")]
    ChecksumMismatch {
        /// CRC embedded in the received frame.
        expected: u16,
        /// CRC recomputed over the received payload.
        actual: u16,
    },

    /// The adapter did not answer within the transport's read timeout.
    #[error("Timeout waiting for adapter response ({received} of {wanted} bytes received)")]
    TransportTimeout {
        /// Bytes of the current read that did arrive.
        received: usize,
        /// Bytes the current read asked for.
        wanted: usize,
    },

    /// Identify reported no target on the programming bus.
    #[error("MSP430 device not found on the programming bus (check wiring and power)")]
    DeviceNotFound,

    /// The adapter reported a non-zero status code.
    #[error("Adapter reported error status {code:#06x}")]
    DeviceProtocol {
        /// Raw status code from the response.
        code: u16,
    },

    /// A single read asked for more bytes than one frame can carry.
    #[error("Read of {requested} bytes exceeds the single-frame limit of {max} bytes")]
    LengthTooLarge {
        /// Requested length.
        requested: usize,
        /// Largest length the adapter accepts in one frame.
        max: usize,
    },

    /// An outgoing payload does not fit in one frame.
    #[error("Payload of {len} bytes exceeds the frame limit of {max} bytes")]
    FrameTooLarge {
        /// Payload length.
        len: usize,
        /// Largest payload one frame can carry.
        max: usize,
    },

    /// The operation is not allowed in the session's current state.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// The session has been closed.
    #[error("Session is closed")]
    SessionClosed,

    /// Read-back data differs from the expected image.
    #[error(
        "Verify failed in segment {address:#06x} at offset {offset}: expected {expected}, read {actual}"
    )]
    VerifyMismatch {
        /// Start address of the segment being verified.
        address: u32,
        /// Offset of the first differing byte within the segment.
        offset: usize,
        /// Expected byte (or length, when the read came back short).
        expected: String,
        /// Byte (or length) actually read back.
        actual: String,
    },

    /// Malformed or truncated response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Image file could not be parsed.
    #[error("Invalid image (line {line}): {reason}")]
    InvalidImage {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Image file format not recognised.
    #[error("Unsupported image format: {0}")]
    UnsupportedImage(String),

    /// A strict segment insertion collided with an existing segment.
    #[error("Segment at {address:#06x} overlaps existing segment at {existing:#06x}")]
    SegmentOverlap {
        /// Address of the rejected segment.
        address: u32,
        /// Address of the segment it collides with.
        existing: u32,
    },

    /// A flat image would exceed the supported address space.
    #[error("Flat image would span {end:#x} bytes, more than the {max:#x} byte limit")]
    ImageTooLarge {
        /// One past the highest address in the image.
        end: u64,
        /// Largest flat image that can be produced.
        max: u64,
    },

    /// Operation stopped at the embedding application's request.
    #[error("Interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a resend of the same command may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::TransportTimeout { .. }
        )
    }
}
