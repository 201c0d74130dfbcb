//! Length-prefixed CBOR framing.
//!
//! Each message is a 4-byte big-endian payload length followed by the CBOR
//! encoding of a [`Request`](crate::Request) or [`Response`](crate::Response).
//! Lengths are validated against a maximum before any payload is buffered.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default cap on a single frame's payload (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20;

/// Framing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Payload length exceeds the configured maximum.
    #[error("frame too large: {size} bytes exceeds maximum of {max}")]
    TooLarge {
        /// Declared or encoded payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Buffer ends before the declared payload.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Encode `message` as a complete frame (prefix + payload).
pub fn encode<T: Serialize>(message: &T, max_size: usize) -> Result<Bytes, FrameError> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(message, &mut payload)
        .map_err(|e| FrameError::Encode(e.to_string()))?;

    if payload.len() > max_size {
        return Err(FrameError::TooLarge { size: payload.len(), max: max_size });
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| FrameError::TooLarge { size: payload.len(), max: max_size })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(len);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Validate a length prefix and return the payload size it declares.
pub fn payload_len(prefix: [u8; LENGTH_PREFIX_SIZE], max_size: usize) -> Result<usize, FrameError> {
    let size = u32::from_be_bytes(prefix) as usize;
    if size > max_size {
        return Err(FrameError::TooLarge { size, max: max_size });
    }
    Ok(size)
}

/// Decode a payload (without its length prefix).
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FrameError> {
    ciborium::de::from_reader(payload).map_err(|e| FrameError::Decode(e.to_string()))
}

/// Decode a complete frame (prefix + payload).
///
/// Trailing bytes after the declared payload are rejected.
pub fn decode<T: DeserializeOwned>(frame: &[u8], max_size: usize) -> Result<T, FrameError> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = frame
        .get(..LENGTH_PREFIX_SIZE)
        .and_then(|p| p.try_into().ok())
        .ok_or(FrameError::Truncated { expected: LENGTH_PREFIX_SIZE, actual: frame.len() })?;

    let size = payload_len(prefix, max_size)?;
    let body = &frame[LENGTH_PREFIX_SIZE..];
    if body.len() < size {
        return Err(FrameError::Truncated { expected: size, actual: body.len() });
    }
    if body.len() > size {
        return Err(FrameError::Decode(format!("{} trailing bytes", body.len() - size)));
    }

    decode_payload(body)
}
