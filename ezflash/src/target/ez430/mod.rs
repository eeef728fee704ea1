//! eZ430 adapter support for MSP430 targets.

pub mod protocol;
pub mod session;

pub use {
    protocol::{Command, DeviceDescriptor, MemoryRange, Opcode, WireMode},
    session::{Session, SessionConfig, SessionState},
};
