//! Wire format encoding and decoding.
//!
//! Every protocol unit on a session's byte stream is:
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │ Length   │ Body                         │
//! │ 2 bytes  │ `Length` bytes               │
//! │ uint16 BE│ msg id (uint16 BE) + payload │
//! └──────────┴──────────────────────────────┘
//! ```
//!
//! The length field counts body bytes only; the 2-byte header itself is
//! excluded. All multi-byte integers are Big Endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{SessionwireError, Result};

/// Length prefix size in bytes (fixed, exactly 2).
pub const HEAD_LENGTH: usize = 2;

/// Default maximum body size in bytes.
pub const MAX_BODY: usize = 2048;

/// Size of the message-type identifier at the front of every body.
pub const MSG_ID_LENGTH: usize = 2;

/// Encode a body length into its 2-byte header.
#[inline]
pub fn encode_length(length: u16) -> [u8; HEAD_LENGTH] {
    length.to_be_bytes()
}

/// Decode a 2-byte header into the body length.
///
/// # Example
///
/// ```
/// use sessionwire::protocol::decode_length;
///
/// assert_eq!(decode_length([0x01, 0x00]), 256);
/// ```
#[inline]
pub fn decode_length(header: [u8; HEAD_LENGTH]) -> u16 {
    u16::from_be_bytes(header)
}

/// Build a wire-ready frame (header + body) using the default [`MAX_BODY`].
pub fn encode_frame(body: &[u8]) -> Result<Bytes> {
    encode_frame_with_limit(body, MAX_BODY)
}

/// Build a wire-ready frame (header + body), rejecting bodies above `max_body`.
///
/// `max_body` is clamped to `u16::MAX`, the largest length the header can carry.
pub fn encode_frame_with_limit(body: &[u8], max_body: usize) -> Result<Bytes> {
    let max = max_body.min(u16::MAX as usize);
    if body.len() > max {
        return Err(SessionwireError::FrameTooLarge {
            length: body.len(),
            max,
        });
    }

    let mut buf = BytesMut::with_capacity(HEAD_LENGTH + body.len());
    buf.put_u16(body.len() as u16);
    buf.extend_from_slice(body);
    Ok(buf.freeze())
}
