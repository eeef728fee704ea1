//! Intel HEX (`.a43`) image parsing.
//!
//! Each record line looks like:
//!
//! ```text
//! :LLAAAATTDD..DDCC
//! ```
//!
//! `LL` data length, `AAAA` address, `TT` record type, `DD` data and `CC`
//! the two's-complement checksum of all preceding bytes. Data records (type
//! `00`) become one segment each; extended linear address records (type
//! `04`) set the upper 16 address bits for the records that follow. All
//! other record types are skipped.

use {
    crate::{
        error::{Error, Result},
        image::segments::SegmentMap,
    },
    byteorder::{BigEndian, ByteOrder},
    log::{debug, trace},
};

/// Data record.
const RECORD_DATA: u8 = 0x00;

/// Extended linear address record.
const RECORD_EXTENDED_LINEAR: u8 = 0x04;

/// Length, address (2), type and checksum bytes around the data.
const RECORD_OVERHEAD: usize = 5;

/// Parse Intel HEX text into a segment map.
pub fn parse(text: &str) -> Result<SegmentMap> {
    let mut segments = SegmentMap::new();
    let mut offset: u32 = 0;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        let Some(body) = line.strip_prefix(':') else {
            continue;
        };

        let record = decode_hex(body).map_err(|reason| invalid(line_no, reason))?;
        if record.len() < RECORD_OVERHEAD {
            return Err(invalid(line_no, "record too short".into()));
        }

        let len = usize::from(record[0]);
        if record.len() != len + RECORD_OVERHEAD {
            return Err(invalid(
                line_no,
                format!(
                    "length field says {len} data bytes, record has {}",
                    record.len() - RECORD_OVERHEAD
                ),
            ));
        }

        let sum = record.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(invalid(
                line_no,
                format!("checksum mismatch (record sums to {sum:#04x})"),
            ));
        }

        let address = BigEndian::read_u16(&record[1..3]);
        let kind = record[3];
        let data = &record[4..4 + len];

        match kind {
            RECORD_EXTENDED_LINEAR => {
                if data.len() < 2 {
                    return Err(invalid(line_no, "extended address record without data".into()));
                }
                offset = u32::from(BigEndian::read_u16(data)) << 16;
                trace!("Extended linear address {offset:#010x}");
            },
            RECORD_DATA => {
                let target = offset + u32::from(address);
                segments.write(target, data.to_vec());
            },
            other => trace!("Skipping record type {other:#04x} on line {line_no}"),
        }
    }

    debug!(
        "Parsed Intel HEX: {} segments, {} bytes",
        segments.len(),
        segments.total_bytes()
    );
    Ok(segments)
}

fn decode_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err("odd number of hex digits".into());
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex digits at column {}", i + 2))
        })
        .collect()
}

fn invalid(line: usize, reason: String) -> Error {
    Error::InvalidImage { line, reason }
}
