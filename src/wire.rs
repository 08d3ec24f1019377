//! Frame format for stream transports.
//!
//! Frame layout: `[length:4][checksum:4][payload:N]`
//!
//! - **length**: total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of the payload
//! - **payload**: codec-encoded message bytes
//!
//! Decoding is incremental: [`try_decode_frame`] consumes a prefix of a
//! read buffer and asks for more data until a whole frame is present. A
//! checksum mismatch or malformed length is a protocol error; the
//! connection carrying the stream must be torn down, since frame
//! boundaries can no longer be trusted.

use thiserror::Error;

/// Header size: 4 (length) + 4 (checksum) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (1 MiB). Larger frames are rejected outright.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Frame encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Checksum verification failed; the stream is corrupt.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum computed over the received payload.
        actual: u32,
    },

    /// Payload exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("frame too large: {size} bytes (max {MAX_PAYLOAD_SIZE})")]
    FrameTooLarge {
        /// Offending payload size in bytes.
        size: usize,
    },

    /// Length field is malformed.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The length value from the header.
        length: u32,
    },
}

/// Encode a payload into a frame.
///
/// # Errors
///
/// Returns `FrameTooLarge` if the payload exceeds [`MAX_PAYLOAD_SIZE`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge {
            size: payload.len(),
        });
    }

    let total = HEADER_SIZE + payload.len();
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&(total as u32).to_le_bytes());
    frame.extend_from_slice(&crc32c::crc32c(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `Ok(Some((payload, consumed)))` when a whole, valid frame is
/// present, `Ok(None)` when more data is needed.
///
/// # Errors
///
/// Returns `InvalidLength`, `FrameTooLarge`, or `ChecksumMismatch` on
/// protocol violations; the caller should drop the connection.
pub fn try_decode_frame(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, WireError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if (length as usize) < HEADER_SIZE {
        return Err(WireError::InvalidLength { length });
    }
    let payload_len = length as usize - HEADER_SIZE;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge { size: payload_len });
    }
    if buf.len() < length as usize {
        return Ok(None);
    }

    let expected = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let payload = &buf[HEADER_SIZE..length as usize];
    let actual = crc32c::crc32c(payload);
    if actual != expected {
        return Err(WireError::ChecksumMismatch { expected, actual });
    }

    Ok(Some((payload.to_vec(), length as usize)))
}
