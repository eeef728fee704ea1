//! Native serial port implementation using the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortEnumerator, PortInfo, SerialConfig},
    },
    log::{debug, trace},
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits},
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
    baud_rate: u32,
}

impl NativePort {
    /// Open a serial port with the given configuration (always 8N1, no flow control).
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!(
            "Opening {} at {} baud, timeout {:?}",
            config.port_name, config.baud_rate, config.timeout
        );
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()?;

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            timeout: config.timeout,
            baud_rate: config.baud_rate,
        })
    }

    fn inner(&mut self) -> std::io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_timeout(timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_buffers(&mut self) -> Result<()> {
        if let Some(ref mut p) = self.port {
            trace!("Clearing buffers on {}", self.name);
            p.clear(ClearBuffer::All)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the device
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner()?.read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner()?.flush()
    }
}

/// Native port enumerator.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let (vid, pid, manufacturer, product) = match &p.port_type {
                    serialport::SerialPortType::UsbPort(info) => (
                        Some(info.vid),
                        Some(info.pid),
                        info.manufacturer.clone(),
                        info.product.clone(),
                    ),
                    _ => (None, None, None, None),
                };

                PortInfo {
                    name: p.port_name,
                    vid,
                    pid,
                    manufacturer,
                    product,
                }
            })
            .collect())
    }
}
