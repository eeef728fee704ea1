//! eZ430 adapter command set.
//!
//! Every command payload shares one layout:
//!
//! ```text
//! +--------+------+-------------+------------------------+-----------+
//! | Opcode | Kind | Param count |  Params (u32 LE each)  |   Data    |
//! +--------+------+-------------+------------------------+-----------+
//! |   1    |  1   |  2 (LE)     |      4 * count         | write only|
//! +--------+------+-------------+------------------------+-----------+
//! ```
//!
//! The parameterless initialize command stops after the kind byte. Write-memory
//! counts only its address as a param; the u32 data length and the data block
//! follow it.

use {
    crate::{
        error::{Error, Result},
        protocol::frame::MAX_PAYLOAD_LEN,
    },
    byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt},
    std::fmt,
};

/// Fixed serial speed of the adapter.
pub const ADAPTER_BAUD: u32 = 460_800;

/// Default target supply voltage in millivolts.
pub const DEFAULT_MILLIVOLTS: u16 = 2700;

/// Identify status meaning "no target on the programming bus".
pub const STATUS_NO_DEVICE: u16 = 0xFF04;

/// Largest single read-memory request.
pub const MAX_READ_LEN: usize = 128;

/// Largest data block carried by one write-memory command.
pub const MAX_WRITE_LEN: usize = 128;

/// Start of the region covered by the erase-all command.
pub const ERASE_ALL_ADDRESS: u32 = 0x1000;

/// Length field sent with the erase-all command.
pub const ERASE_ALL_LENGTH: u32 = 0x0100;

/// Configuration item selecting the debug interface wiring.
const CONFIG_ITEM_INTERFACE: u32 = 0x08;

/// Identify parameter requesting the device descriptor block.
const IDENTIFY_DESCRIPTOR: u32 = 0x50;

/// Erase type for a mass erase of main memory.
const ERASE_TYPE_ALL: u32 = 0x02;

/// Reset line flags.
const RESET_PUC: u32 = 1 << 0;
const RESET_RST: u32 = 1 << 1;
const RESET_VCC: u32 = 1 << 2;

/// Bytes before the data block in a write-memory payload.
const WRITE_HEADER_LEN: usize = 12;

/// Adapter opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Open the adapter connection.
    Initialize = 0x01,
    /// Identify the attached target.
    Identify = 0x03,
    /// Set an interface configuration item.
    Configure = 0x05,
    /// Set target supply voltage.
    SetVoltage = 0x06,
    /// Drive the target's reset lines.
    Reset = 0x07,
    /// Erase target flash.
    Erase = 0x0C,
    /// Read target memory.
    ReadMemory = 0x0D,
    /// Write target memory.
    WriteMemory = 0x0E,
    /// Secondary identify query.
    IdentifyExtended = 0x28,
}

/// Argument block type following the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Kind {
    Bare = 0x01,
    Params = 0x02,
    ParamsAndData = 0x04,
}

/// Debug interface wiring between adapter and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum WireMode {
    /// Two-wire Spy-Bi-Wire.
    #[default]
    SpyBiWire,
    /// Classic 4-wire JTAG.
    FourWire,
}

impl WireMode {
    fn flag(self) -> u32 {
        match self {
            Self::SpyBiWire => 1,
            Self::FourWire => 0,
        }
    }

    /// Parse a wire mode name (`sbw`, `spy-bi-wire`, `jtag`, `4-wire`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sbw" | "spy-bi-wire" | "spybiwire" | "2-wire" => Some(Self::SpyBiWire),
            "jtag" | "4-wire" | "four-wire" => Some(Self::FourWire),
            _ => None,
        }
    }
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpyBiWire => write!(f, "Spy-Bi-Wire"),
            Self::FourWire => write!(f, "4-wire JTAG"),
        }
    }
}

/// A command ready to be encoded into a frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Open the adapter connection.
    Initialize,
    /// Select the debug interface wiring.
    Configure {
        /// Interface wiring.
        wire_mode: WireMode,
    },
    /// Set target supply voltage.
    SetVoltage {
        /// Voltage in millivolts.
        millivolts: u16,
    },
    /// Identify the attached target.
    Identify,
    /// Secondary identify query sent after [`Command::Identify`].
    ///
    /// The reply does not match any documented layout and is not parsed.
    IdentifyExtended,
    /// Mass-erase main flash.
    EraseAll,
    /// Pulse PUC, RST and VCC.
    Reset {
        /// Flag byte reported to the adapter.
        failure: bool,
    },
    /// Read `length` bytes from `address`.
    ReadMemory {
        /// Start address.
        address: u32,
        /// Number of bytes.
        length: u16,
    },
    /// Write `data` at `address`.
    WriteMemory {
        /// Start address.
        address: u32,
        /// Bytes to write.
        data: &'a [u8],
    },
}

impl Command<'_> {
    /// Opcode of this command.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Initialize => Opcode::Initialize,
            Self::Configure { .. } => Opcode::Configure,
            Self::SetVoltage { .. } => Opcode::SetVoltage,
            Self::Identify => Opcode::Identify,
            Self::IdentifyExtended => Opcode::IdentifyExtended,
            Self::EraseAll => Opcode::Erase,
            Self::Reset { .. } => Opcode::Reset,
            Self::ReadMemory { .. } => Opcode::ReadMemory,
            Self::WriteMemory { .. } => Opcode::WriteMemory,
        }
    }

    /// Encode the command payload (without framing).
    pub fn payload(&self) -> Result<Vec<u8>> {
        let payload = match *self {
            Self::Initialize => vec![Opcode::Initialize as u8, Kind::Bare as u8],
            Self::Configure { wire_mode } => {
                params(Opcode::Configure, &[CONFIG_ITEM_INTERFACE, wire_mode.flag()])
            },
            Self::SetVoltage { millivolts } => {
                params(Opcode::SetVoltage, &[u32::from(millivolts)])
            },
            Self::Identify => params(Opcode::Identify, &[IDENTIFY_DESCRIPTOR, 0]),
            Self::IdentifyExtended => params(Opcode::IdentifyExtended, &[0, 0, 0]),
            Self::EraseAll => params(
                Opcode::Erase,
                &[ERASE_TYPE_ALL, ERASE_ALL_ADDRESS, ERASE_ALL_LENGTH],
            ),
            Self::Reset { failure } => {
                let flag = u32::from(failure);
                params(
                    Opcode::Reset,
                    &[RESET_PUC | RESET_RST | RESET_VCC, flag, flag],
                )
            },
            Self::ReadMemory { address, length } => {
                params(Opcode::ReadMemory, &[address, u32::from(length)])
            },
            Self::WriteMemory { address, data } => {
                if data.len() > MAX_PAYLOAD_LEN - WRITE_HEADER_LEN {
                    return Err(Error::FrameTooLarge {
                        len: data.len(),
                        max: MAX_PAYLOAD_LEN - WRITE_HEADER_LEN,
                    });
                }
                #[allow(clippy::cast_possible_truncation)] // checked above
                let len = data.len() as u32;
                let mut payload = header(Opcode::WriteMemory, Kind::ParamsAndData, 1);
                push_u32(&mut payload, address);
                push_u32(&mut payload, len);
                payload.extend_from_slice(data);
                payload
            },
        };
        Ok(payload)
    }
}

fn header(opcode: Opcode, kind: Kind, count: u16) -> Vec<u8> {
    let mut buf = vec![opcode as u8, kind as u8];
    buf.extend_from_slice(&count.to_le_bytes());
    buf
}

#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.write_u32::<LittleEndian>(value).unwrap();
}

#[allow(clippy::cast_possible_truncation)] // at most three params
fn params(opcode: Opcode, values: &[u32]) -> Vec<u8> {
    let mut buf = header(opcode, Kind::Params, values.len() as u16);
    for &value in values {
        push_u32(&mut buf, value);
    }
    buf
}

/// Inclusive address range of a target memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MemoryRange {
    /// First address.
    pub start: u16,
    /// Last address.
    pub end: u16,
}

impl MemoryRange {
    /// Whether `address` lies inside the range.
    pub fn contains(&self, address: u32) -> bool {
        (u32::from(self.start)..=u32::from(self.end)).contains(&address)
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}-0x{:04X}", self.start, self.end)
    }
}

/// Parsed identify response.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceDescriptor {
    /// Part name reported by the adapter (e.g. `MSP430F20x3`).
    pub part: String,
    /// Main flash.
    pub main_memory: MemoryRange,
    /// Information flash.
    pub info_memory: MemoryRange,
    /// RAM.
    pub ram: MemoryRange,
    /// Chip type byte.
    pub chip_type: u8,
    /// Lowest operating voltage in millivolts.
    pub voltage_min_mv: u16,
    /// Highest operating voltage in millivolts.
    pub voltage_max_mv: u16,
}

/// Byte offsets inside an identify response payload.
mod identify_layout {
    use std::ops::Range;

    pub const STATUS: Range<usize> = 2..4;
    pub const CHIP_TYPE: usize = 10;
    pub const PART: Range<usize> = 12..44;
    pub const MAIN_START: Range<usize> = 44..46;
    pub const INFO_START: Range<usize> = 46..48;
    pub const RAM_END: Range<usize> = 48..50;
    // Read low byte first like every other word here; older host tools
    // combine these two bytes high byte first.
    pub const RAM_START: Range<usize> = 50..52;
    pub const VOLTAGE_MAX: Range<usize> = 62..64;
    pub const VOLTAGE_MIN: Range<usize> = 64..66;
    pub const INFO_END: Range<usize> = 72..74;
    pub const MAIN_END: Range<usize> = 74..76;
    pub const MIN_LEN: usize = 76;
}

/// Status word at the head of an identify response.
///
/// Stored high byte first, unlike the rest of the protocol.
pub fn response_status(payload: &[u8]) -> Result<u16> {
    payload
        .get(identify_layout::STATUS)
        .map(BigEndian::read_u16)
        .ok_or_else(|| {
            Error::Protocol(format!(
                "response of {} bytes has no status word",
                payload.len()
            ))
        })
}

impl DeviceDescriptor {
    /// Parse an identify response payload.
    ///
    /// Status `0xFF04` maps to [`Error::DeviceNotFound`], any other non-zero
    /// status to [`Error::DeviceProtocol`].
    pub fn parse(payload: &[u8]) -> Result<Self> {
        use identify_layout as at;

        match response_status(payload)? {
            0 => {},
            STATUS_NO_DEVICE => return Err(Error::DeviceNotFound),
            code => return Err(Error::DeviceProtocol { code }),
        }

        if payload.len() < at::MIN_LEN {
            return Err(Error::Protocol(format!(
                "identify response too short: {} bytes, need {}",
                payload.len(),
                at::MIN_LEN
            )));
        }

        let word = |range: std::ops::Range<usize>| LittleEndian::read_u16(&payload[range]);
        let part_bytes = &payload[at::PART];
        let part_len = part_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(part_bytes.len());
        let part = String::from_utf8_lossy(&part_bytes[..part_len])
            .trim()
            .to_string();

        Ok(Self {
            part,
            main_memory: MemoryRange {
                start: word(at::MAIN_START),
                end: word(at::MAIN_END),
            },
            info_memory: MemoryRange {
                start: word(at::INFO_START),
                end: word(at::INFO_END),
            },
            ram: MemoryRange {
                start: word(at::RAM_START),
                end: word(at::RAM_END),
            },
            chip_type: payload[at::CHIP_TYPE],
            voltage_min_mv: word(at::VOLTAGE_MIN),
            voltage_max_mv: word(at::VOLTAGE_MAX),
        })
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Part:        {}", self.part)?;
        writeln!(f, "Main memory: {}", self.main_memory)?;
        writeln!(f, "Info memory: {}", self.info_memory)?;
        writeln!(f, "RAM:         {}", self.ram)?;
        writeln!(f, "Chip type:   0x{:02X}", self.chip_type)?;
        write!(
            f,
            "Voltage:     {:.3}-{:.3} V",
            f64::from(self.voltage_min_mv) / 1000.0,
            f64::from(self.voltage_max_mv) / 1000.0
        )
    }
}

/// Offset of the data block in a read-memory response.
const READ_DATA_OFFSET: usize = 8;

/// Extract the data block from a read-memory response payload.
pub fn parse_read_response(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < READ_DATA_OFFSET {
        return Err(Error::Protocol(format!(
            "read response too short: {} bytes",
            payload.len()
        )));
    }

    let length = usize::from(LittleEndian::read_u16(&payload[4..6]));
    let data = &payload[READ_DATA_OFFSET..];
    if data.len() < length {
        return Err(Error::Protocol(format!(
            "read response announces {length} bytes but carries {}",
            data.len()
        )));
    }

    Ok(data[..length].to_vec())
}
