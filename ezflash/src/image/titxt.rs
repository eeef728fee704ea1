//! TI-TXT (`.txt`) image parsing.
//!
//! ```text
//! @F800
//! 31 40 80 02 40 B2 80 5A
//! @FFFE
//! 00 F8
//! q
//! ```
//!
//! `@` lines set the address of the bytes that follow, data lines hold
//! whitespace-separated hex bytes and `q` ends the file. Data is cut into
//! segments of at most `chunk_size` bytes, each stored at its own address.

use {
    crate::{
        error::{Error, Result},
        image::segments::SegmentMap,
    },
    log::debug,
};

/// Default segment size for TI-TXT images.
pub const DEFAULT_CHUNK_SIZE: usize = 32;

/// Parse TI-TXT text into a segment map with segments of `chunk_size` bytes.
pub fn parse(text: &str, chunk_size: usize) -> Result<SegmentMap> {
    if chunk_size == 0 {
        return Err(Error::Config("TI-TXT chunk size must be non-zero".into()));
    }

    let mut segments = SegmentMap::new();
    let mut chunk = Chunker {
        address: 0,
        pending: Vec::with_capacity(chunk_size),
        chunk_size,
    };

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if let Some(addr) = line.strip_prefix('@') {
            chunk.flush(&mut segments)?;
            chunk.address = u32::from_str_radix(addr.trim(), 16).map_err(|e| {
                Error::InvalidImage {
                    line: line_no,
                    reason: format!("invalid address '{addr}': {e}"),
                }
            })?;
        } else if line.starts_with(['q', 'Q']) {
            break;
        } else {
            for token in line.split_whitespace() {
                let byte = u8::from_str_radix(token, 16).map_err(|e| Error::InvalidImage {
                    line: line_no,
                    reason: format!("invalid byte '{token}': {e}"),
                })?;
                chunk.push(byte, &mut segments)?;
            }
        }
    }
    chunk.flush(&mut segments)?;

    debug!(
        "Parsed TI-TXT: {} segments, {} bytes",
        segments.len(),
        segments.total_bytes()
    );
    Ok(segments)
}

struct Chunker {
    address: u32,
    pending: Vec<u8>,
    chunk_size: usize,
}

impl Chunker {
    fn push(&mut self, byte: u8, segments: &mut SegmentMap) -> Result<()> {
        self.pending.push(byte);
        if self.pending.len() >= self.chunk_size {
            self.flush(segments)?;
        }
        Ok(())
    }

    fn flush(&mut self, segments: &mut SegmentMap) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let data = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
        let len = u32::try_from(data.len())
            .map_err(|_| Error::Config("TI-TXT chunk size too large".into()))?;
        segments.write(self.address, data);
        self.address = self.address.wrapping_add(len);
        Ok(())
    }
}
