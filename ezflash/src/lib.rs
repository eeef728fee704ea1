//! # ezflash
//!
//! A library for programming MSP430 flash through the TI eZ430 USB adapter.
//!
//! This crate provides the host side of the adapter's serial protocol:
//!
//! - CRC-16 (X.25) checksum calculation
//! - Request/response frame codec
//! - Intel HEX (`.a43`) and TI-TXT image parsing into address-keyed segments
//! - A device session that opens, identifies, erases, writes, verifies and
//!   resets the target
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use ezflash::{Session, SessionConfig, WireMode, image::load_image};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = load_image("firmware.a43", ezflash::image::DEFAULT_CHUNK_SIZE)?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let config = SessionConfig::default()
//!             .with_wire_mode(WireMode::SpyBiWire)
//!             .with_millivolts(3000);
//!         let mut session = Session::connect("/dev/ttyUSB1", config)?;
//!
//!         let device = session.identify()?;
//!         println!("Found {}", device.part);
//!
//!         session.erase_all()?;
//!         session.write_memory_with_progress(&image, &mut |done, total| {
//!             println!("Writing: {done}/{total}");
//!         })?;
//!         session.check_memory(&image)?;
//!         session.reset(false)?;
//!         session.close()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod target;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current write or verify should
/// stop (for example after receiving Ctrl-C in CLI applications). Only the
/// first registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

/// Serializes tests that touch the global interrupt flag.
#[cfg(test)]
pub(crate) fn interrupt_test_guard() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, PoisonError};

    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    error::{Error, Result},
    image::{ImageFormat, SegmentMap, load_image},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::crc::crc16,
    target::ez430::{
        DeviceDescriptor, MemoryRange, Session, SessionConfig, SessionState, WireMode,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        let _guard = interrupt_test_guard();
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        let _guard = interrupt_test_guard();
        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }
}
