//! Serial port abstraction.
//!
//! The device session talks to the adapter through the [`Port`] trait, so
//! the protocol code never touches a concrete serial implementation:
//!
//! ```text
//! +------------------+
//! |  Device Session  |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+      +------------------+
//! |    Port trait    | <--- | scripted adapter |  (tests)
//! +--------+---------+      +------------------+
//!          |
//!          v
//! +--------+---------+
//! |    NativePort    |
//! |   (serialport)   |
//! +------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::{error::Result, target::ez430::protocol::ADAPTER_BAUD};

/// Default read timeout for adapter responses.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Serial port configuration.
///
/// The adapter always runs 8 data bits, no parity, one stop bit and no flow
/// control; only the device path, speed and timeout vary.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB1", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: ADAPTER_BAUD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Configuration for the adapter on `port_name`.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

impl PortInfo {
    /// Whether the USB IDs match the eZ430 adapter (TI 0451:F432).
    pub fn is_ez430(&self) -> bool {
        self.vid == Some(EZ430_VID) && self.pid == Some(EZ430_PID)
    }
}

/// Texas Instruments USB vendor ID.
pub const EZ430_VID: u16 = 0x0451;

/// eZ430 adapter USB product ID.
pub const EZ430_PID: u16 = 0xF432;

/// Byte-stream link to the adapter.
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Drop any bytes waiting in the input and output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Trait for listing available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;

    /// Ports that look like an eZ430 adapter.
    fn find_adapters() -> Result<Vec<PortInfo>> {
        Ok(Self::list_ports()?
            .into_iter()
            .filter(PortInfo::is_ez430)
            .collect())
    }
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
