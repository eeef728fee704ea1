//! Target support.
//!
//! Only the eZ430 USB adapter driving MSP430 parts is supported today.

pub mod ez430;
