//! eZ430 device session.
//!
//! A [`Session`] owns the link to the adapter and walks the target through
//! its lifecycle:
//!
//! ```text
//! Closed -> Opened -> Configured -> Identified -> Programming
//!    ^                                                 |
//!    +------------------- close() --------------------+
//! ```
//!
//! Every command is strict ping-pong: one request frame, then a blocking read
//! of its response before anything else goes out.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ezflash::{Session, SessionConfig, image::load_image};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = load_image("blink.a43", ezflash::image::DEFAULT_CHUNK_SIZE)?;
//!
//!     let mut session = Session::connect("/dev/ttyUSB1", SessionConfig::default())?;
//!     let device = session.identify()?;
//!     println!("{device}");
//!
//!     session.erase_all()?;
//!     session.write_memory(&image)?;
//!     assert!(session.verify_memory(&image)?);
//!     session.reset(false)?;
//!     session.close()?;
//!     Ok(())
//! }
//! ```

use {
    crate::{
        error::{Error, Result},
        image::SegmentMap,
        is_interrupted_requested,
        port::{DEFAULT_TIMEOUT, Port},
        protocol::frame,
        target::ez430::protocol::{
            Command, DEFAULT_MILLIVOLTS, DeviceDescriptor, MAX_READ_LEN, MAX_WRITE_LEN,
            WireMode, parse_read_response,
        },
    },
    log::{debug, info, trace, warn},
    std::{fmt, time::Duration},
};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// No adapter connection.
    Closed,
    /// Adapter initialized.
    Opened,
    /// Interface and supply voltage configured.
    Configured,
    /// Target identified.
    Identified,
    /// Flash erased or written.
    Programming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opened => "opened",
            Self::Configured => "configured",
            Self::Identified => "identified",
            Self::Programming => "programming",
        };
        f.write_str(name)
    }
}

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Target supply voltage in millivolts.
    pub millivolts: u16,
    /// Debug interface wiring.
    pub wire_mode: WireMode,
    /// Read timeout for each response.
    pub timeout: Duration,
    /// Extra attempts after a checksum mismatch or timeout.
    pub retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            millivolts: DEFAULT_MILLIVOLTS,
            wire_mode: WireMode::default(),
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
        }
    }
}

impl SessionConfig {
    /// Set the target supply voltage.
    #[must_use]
    pub fn with_millivolts(mut self, millivolts: u16) -> Self {
        self.millivolts = millivolts;
        self
    }

    /// Set the debug interface wiring.
    #[must_use]
    pub fn with_wire_mode(mut self, wire_mode: WireMode) -> Self {
        self.wire_mode = wire_mode;
        self
    }

    /// Set the response timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many times a corrupted or missing response is retried.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Connection to an MSP430 target through the eZ430 adapter.
///
/// Generic over the port type `P`, so tests can drive it with a scripted
/// adapter instead of real hardware.
pub struct Session<P: Port> {
    port: Option<P>,
    state: SessionState,
    config: SessionConfig,
    descriptor: Option<DeviceDescriptor>,
}

impl<P: Port> Session<P> {
    /// Create a session over an already opened port. Nothing is sent until [`open`](Self::open).
    pub fn new(port: P, config: SessionConfig) -> Self {
        Self {
            port: Some(port),
            state: SessionState::Closed,
            config,
            descriptor: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Descriptor from the last successful [`identify`](Self::identify).
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    /// Get a reference to the underlying port, if the session is still open.
    pub fn port(&self) -> Option<&P> {
        self.port.as_ref()
    }

    /// Initialize the adapter, select the wire mode and power the target.
    pub fn open(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::SessionClosed)?;
        if self.state != SessionState::Closed {
            return Err(Error::InvalidState {
                operation: "open",
                state: self.state,
            });
        }

        info!("Opening adapter on {}", port.name());
        port.set_timeout(self.config.timeout)?;
        port.clear_buffers()?;

        self.transact(&Command::Initialize)?;
        self.state = SessionState::Opened;

        debug!(
            "Configuring {} at {} mV",
            self.config.wire_mode, self.config.millivolts
        );
        self.transact(&Command::Configure {
            wire_mode: self.config.wire_mode,
        })?;
        self.transact(&Command::SetVoltage {
            millivolts: self.config.millivolts,
        })?;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Ask the adapter which target is attached.
    pub fn identify(&mut self) -> Result<DeviceDescriptor> {
        self.require("identify", SessionState::Configured)?;

        let response = self.transact(&Command::Identify)?;
        let descriptor = DeviceDescriptor::parse(&response)?;
        info!("Found {}", descriptor.part);
        debug!(
            "main {}, info {}, ram {}",
            descriptor.main_memory, descriptor.info_memory, descriptor.ram
        );

        self.state = self.state.max(SessionState::Identified);
        self.descriptor = Some(descriptor.clone());
        Ok(descriptor)
    }

    /// Send the secondary identify query and discard its reply.
    ///
    /// Programming sequences issue it right after [`identify`](Self::identify).
    pub fn identify_extended(&mut self) -> Result<()> {
        self.require("identify extended", SessionState::Identified)?;

        self.transact(&Command::IdentifyExtended)?;
        Ok(())
    }

    /// Mass-erase main flash.
    pub fn erase_all(&mut self) -> Result<()> {
        self.require("erase", SessionState::Identified)?;

        info!("Erasing flash");
        self.transact(&Command::EraseAll)?;
        self.state = SessionState::Programming;
        Ok(())
    }

    /// Read `length` bytes starting at `address`.
    ///
    /// One call is one frame, so `length` may not exceed [`MAX_READ_LEN`].
    pub fn read_memory(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
        self.require("read memory", SessionState::Identified)?;
        if length > MAX_READ_LEN {
            return Err(Error::LengthTooLarge {
                requested: length,
                max: MAX_READ_LEN,
            });
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        #[allow(clippy::cast_possible_truncation)] // bounded by MAX_READ_LEN
        let length16 = length as u16;
        trace!("Reading {length} bytes at {address:#06x}");
        let response = self.transact(&Command::ReadMemory {
            address,
            length: length16,
        })?;
        parse_read_response(&response)
    }

    /// Write every segment of `segments`, lowest address first.
    ///
    /// The session does not erase first; call [`erase_all`](Self::erase_all)
    /// when the target needs a clean flash.
    pub fn write_memory(&mut self, segments: &SegmentMap) -> Result<()> {
        self.write_memory_with_progress(segments, &mut |_, _| {})
    }

    /// Same as [`write_memory`](Self::write_memory), reporting
    /// `(bytes_done, bytes_total)` after each frame.
    pub fn write_memory_with_progress(
        &mut self,
        segments: &SegmentMap,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        self.require("write memory", SessionState::Identified)?;

        let total = segments.total_bytes();
        let mut done = 0;
        info!(
            "Writing {} segments ({total} bytes)",
            segments.len()
        );

        for (address, data) in segments.iter() {
            debug!("Writing segment {address:#06x} ({} bytes)", data.len());
            for (index, chunk) in data.chunks(MAX_WRITE_LEN).enumerate() {
                if is_interrupted_requested() {
                    return Err(Error::Interrupted);
                }
                let chunk_address = offset_address(address, index * MAX_WRITE_LEN)?;
                self.transact(&Command::WriteMemory {
                    address: chunk_address,
                    data: chunk,
                })?;
                self.state = SessionState::Programming;
                done += chunk.len();
                progress(done, total);
            }
        }
        Ok(())
    }

    /// Read every segment back and compare it with `segments`.
    ///
    /// Returns `Ok(false)` at the first differing byte.
    pub fn verify_memory(&mut self, segments: &SegmentMap) -> Result<bool> {
        match self.check_memory(segments) {
            Ok(()) => Ok(true),
            Err(Error::VerifyMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read every segment back, failing with [`Error::VerifyMismatch`] at the
    /// first difference.
    pub fn check_memory(&mut self, segments: &SegmentMap) -> Result<()> {
        self.check_memory_with_progress(segments, &mut |_, _| {})
    }

    /// Same as [`check_memory`](Self::check_memory), reporting
    /// `(bytes_done, bytes_total)` after each frame.
    pub fn check_memory_with_progress(
        &mut self,
        segments: &SegmentMap,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        self.require("verify memory", SessionState::Identified)?;

        let total = segments.total_bytes();
        let mut done = 0;
        info!("Verifying {} segments ({total} bytes)", segments.len());

        for (address, expected) in segments.iter() {
            trace!("Verifying segment {address:#06x}");
            for (index, want) in expected.chunks(MAX_READ_LEN).enumerate() {
                if is_interrupted_requested() {
                    return Err(Error::Interrupted);
                }
                let offset = index * MAX_READ_LEN;
                let got = self.read_memory(offset_address(address, offset)?, want.len())?;

                if let Some(pos) = want.iter().zip(&got).position(|(a, b)| a != b) {
                    return Err(Error::VerifyMismatch {
                        address,
                        offset: offset + pos,
                        expected: format!("{:#04x}", want[pos]),
                        actual: format!("{:#04x}", got[pos]),
                    });
                }
                if got.len() < want.len() {
                    return Err(Error::VerifyMismatch {
                        address,
                        offset: offset + got.len(),
                        expected: format!("{} bytes", want.len()),
                        actual: format!("{} bytes", got.len()),
                    });
                }

                done += want.len();
                progress(done, total);
            }
        }
        Ok(())
    }

    /// Pulse the target's reset lines.
    ///
    /// `failure` is passed through to the adapter as the run-result flag.
    pub fn reset(&mut self, failure: bool) -> Result<()> {
        self.require("reset", SessionState::Configured)?;

        info!("Resetting target");
        self.transact(&Command::Reset { failure })?;
        Ok(())
    }

    /// Release the port. Closing an already closed session does nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            info!("Closing {}", port.name());
            self.state = SessionState::Closed;
            port.close()?;
        }
        Ok(())
    }

    fn require(&self, operation: &'static str, minimum: SessionState) -> Result<()> {
        if self.port.is_none() {
            return Err(Error::SessionClosed);
        }
        if self.state < minimum {
            return Err(Error::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Send one command and wait for its response payload.
    fn transact(&mut self, command: &Command<'_>) -> Result<Vec<u8>> {
        let request = frame::encode(&command.payload()?)?;
        let retries = self.config.retries;
        let port = self.port.as_mut().ok_or(Error::SessionClosed)?;

        let mut attempt = 0;
        loop {
            trace!("-> {request:02X?}");
            port.write_all_bytes(&request)?;

            match frame::decode(port) {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < retries => {
                    attempt += 1;
                    warn!(
                        "{:?} failed (attempt {attempt}/{}): {e}",
                        command.opcode(),
                        retries + 1
                    );
                    port.clear_buffers()?;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(feature = "native")]
impl Session<crate::port::NativePort> {
    /// Open the adapter on `port_name` and run [`open`](Self::open).
    pub fn connect(port_name: &str, config: SessionConfig) -> Result<Self> {
        use crate::port::{NativePort, SerialConfig};

        let serial = SerialConfig::new(port_name).with_timeout(config.timeout);
        let port = NativePort::open(&serial)?;
        let mut session = Self::new(port, config);
        session.open()?;
        Ok(session)
    }
}

fn offset_address(base: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| Error::Protocol(format!("address {base:#x} + {offset} overflows")))
}
