//! eZ430 serial framing.
//!
//! The two directions use different layouts.
//!
//! ## Host to adapter
//!
//! ```text
//! +--------+------+-----------------+--------+--------+------+
//! | Length | 0x7E |     Payload     | CRC lo | CRC hi | 0x7E |
//! +--------+------+-----------------+--------+--------+------+
//! | 1 byte |  1   |    variable     |   1    |   1    |  1   |
//! +--------+------+-----------------+--------+--------+------+
//! ```
//!
//! `Length` is the payload length plus 4.
//!
//! ## Adapter to host
//!
//! ```text
//! +----------------+-----------------+----------------+
//! |  Length (LE)   |     Payload     |   CRC16 (LE)   |
//! +----------------+-----------------+----------------+
//! |    2 bytes     |    variable     |    2 bytes     |
//! +----------------+-----------------+----------------+
//! ```
//!
//! `Length` counts the payload and CRC bytes. In both directions the CRC
//! covers the payload only.

use {
    crate::{
        error::{Error, Result},
        protocol::crc::crc16,
    },
    byteorder::{ByteOrder, LittleEndian},
    log::trace,
    std::io::{ErrorKind, Read},
};

/// Boundary marker around outgoing payloads.
pub const FRAME_BOUNDARY: u8 = 0x7E;

/// Bytes an outgoing frame adds around its payload (length, markers, CRC).
pub const REQUEST_OVERHEAD: usize = 5;

/// Largest payload an outgoing frame can carry.
///
/// The length byte holds `payload + 4`, so the payload is capped at 251 bytes.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 4;

/// Wrap a command payload for transmission to the adapter.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::FrameTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let crc = crc16(payload);
    #[allow(clippy::cast_possible_truncation)] // bounded by MAX_PAYLOAD_LEN
    let len_byte = (payload.len() + 4) as u8;
    let mut frame = Vec::with_capacity(payload.len() + REQUEST_OVERHEAD);
    frame.push(len_byte);
    frame.push(FRAME_BOUNDARY);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.push(FRAME_BOUNDARY);
    Ok(frame)
}

/// Read one response frame from `reader` and return its payload.
///
/// Blocks until the whole frame has arrived. A read timeout on the transport
/// becomes [`Error::TransportTimeout`]; a payload whose CRC disagrees with
/// the trailing checksum becomes [`Error::ChecksumMismatch`].
pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let mut head = [0u8; 2];
    read_full(reader, &mut head)?;
    let len = usize::from(LittleEndian::read_u16(&head));
    if len < 2 {
        return Err(Error::Protocol(format!(
            "response length {len} is shorter than its checksum"
        )));
    }

    let mut payload = vec![0u8; len - 2];
    read_full(reader, &mut payload)?;

    let mut tail = [0u8; 2];
    read_full(reader, &mut tail)?;
    let expected = LittleEndian::read_u16(&tail);
    let actual = crc16(&payload);
    trace!("<- {payload:02X?} crc {expected:#06x}");

    if expected != actual {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    Ok(payload)
}

/// Build a frame in the adapter-to-host layout.
///
/// Used by simulated adapters and tests.
pub fn encode_response(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len() + 2).map_err(|_| Error::FrameTooLarge {
        len: payload.len(),
        max: usize::from(u16::MAX) - 2,
    })?;

    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc16(payload).to_le_bytes());
    Ok(frame)
}

/// Parse a complete host-to-adapter frame and return its payload.
///
/// This is the adapter's view of [`encode`], used by simulated adapters and tests.
pub fn decode_request(frame: &[u8]) -> Result<Vec<u8>> {
    if frame.len() < REQUEST_OVERHEAD {
        return Err(Error::Protocol(format!(
            "request frame of {} bytes is too short",
            frame.len()
        )));
    }

    let payload_len = usize::from(frame[0]).saturating_sub(4);
    if frame.len() != payload_len + REQUEST_OVERHEAD {
        return Err(Error::Protocol(format!(
            "request length byte {} does not match frame of {} bytes",
            frame[0],
            frame.len()
        )));
    }
    if frame[1] != FRAME_BOUNDARY || frame[frame.len() - 1] != FRAME_BOUNDARY {
        return Err(Error::Protocol("request frame boundary missing".into()));
    }

    let payload = &frame[2..2 + payload_len];
    let expected = LittleEndian::read_u16(&frame[2 + payload_len..4 + payload_len]);
    let actual = crc16(payload);
    if expected != actual {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    Ok(payload.to_vec())
}

/// `read_exact` that reports how far it got when the transport times out.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "adapter closed the connection",
                )));
            },
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Err(Error::TransportTimeout {
                    received: filled,
                    wanted: buf.len(),
                });
            },
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Reader that yields its bytes and then times out, like an idle serial port.
    struct TimeoutReader(VecDeque<u8>);

    impl Read for TimeoutReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(self.0.len());
            for b in buf.iter_mut().take(n) {
                *b = self.0.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    fn reader(bytes: &[u8]) -> TimeoutReader {
        TimeoutReader(bytes.iter().copied().collect())
    }

    fn sample_payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 37 + 11) as u8).collect()
    }

    #[test]
    fn test_encode_initialize_frame() {
        let frame = encode(&[0x01, 0x01]).unwrap();
        assert_eq!(frame, vec![0x06, 0x7E, 0x01, 0x01, 0x16, 0x07, 0x7E]);
    }

    #[test]
    fn test_encode_length_byte() {
        let payload = sample_payload(12);
        let frame = encode(&payload).unwrap();
        assert_eq!(frame[0], 16);
        assert_eq!(frame.len(), payload.len() + REQUEST_OVERHEAD);
        assert_eq!(&frame[2..14], payload.as_slice());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        assert!(encode(&sample_payload(MAX_PAYLOAD_LEN)).is_ok());
        let err = encode(&sample_payload(MAX_PAYLOAD_LEN + 1)).unwrap_err();
        assert!(matches!(
            err,
            Error::FrameTooLarge {
                len: 252,
                max: 251
            }
        ));
    }

    #[test]
    fn test_decode_known_response() {
        // len = 4 (2 payload + 2 crc), payload 01 01
        let bytes = [0x04, 0x00, 0x01, 0x01, 0x16, 0x07];
        assert_eq!(decode(&mut reader(&bytes)).unwrap(), vec![0x01, 0x01]);
    }

    #[test]
    fn test_round_trip_both_directions() {
        for len in 1..=250 {
            let payload = sample_payload(len);

            let request = encode(&payload).unwrap();
            assert_eq!(decode_request(&request).unwrap(), payload, "request len {len}");

            let response = encode_response(&payload).unwrap();
            assert_eq!(
                decode(&mut reader(&response)).unwrap(),
                payload,
                "response len {len}"
            );
        }
    }

    #[test]
    fn test_corrupted_response_is_rejected() {
        let payload = sample_payload(20);
        let frame = encode_response(&payload).unwrap();
        // Payload and CRC bytes, excluding the length prefix.
        for i in 2..frame.len() {
            let mut corrupted = frame.clone();
            corrupted[i] ^= 0x5A;
            let err = decode(&mut reader(&corrupted)).unwrap_err();
            assert!(
                matches!(err, Error::ChecksumMismatch { .. }),
                "byte {i}: {err}"
            );
        }
    }

    #[test]
    fn test_corrupted_request_is_rejected() {
        let payload = sample_payload(20);
        let frame = encode(&payload).unwrap();
        // Payload and CRC bytes, excluding length byte and boundary markers.
        for i in 2..frame.len() - 1 {
            let mut corrupted = frame.clone();
            corrupted[i] ^= 0x01;
            let err = decode_request(&corrupted).unwrap_err();
            assert!(
                matches!(err, Error::ChecksumMismatch { .. }),
                "byte {i}: {err}"
            );
        }
    }

    #[test]
    fn test_truncated_response_times_out() {
        let frame = encode_response(&sample_payload(8)).unwrap();
        let err = decode(&mut reader(&frame[..6])).unwrap_err();
        assert!(matches!(
            err,
            Error::TransportTimeout {
                received: 4,
                wanted: 8
            }
        ));
    }

    #[test]
    fn test_silent_adapter_times_out() {
        let err = decode(&mut reader(&[])).unwrap_err();
        assert!(matches!(
            err,
            Error::TransportTimeout {
                received: 0,
                wanted: 2
            }
        ));
    }

    #[test]
    fn test_closed_stream_is_io_error() {
        let err = decode(&mut std::io::Cursor::new(vec![0x04])).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_decode_rejects_short_length() {
        let err = decode(&mut reader(&[0x01, 0x00, 0xAA])).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_decode_request_rejects_bad_markers() {
        let mut frame = encode(&[0x03, 0x02]).unwrap();
        let last = frame.len() - 1;
        frame[last] = 0x00;
        assert!(matches!(decode_request(&frame), Err(Error::Protocol(_))));
    }
}
