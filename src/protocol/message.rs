//! Message body layout: identifier plus payload.
//!
//! A reassembled frame body always starts with a 2-byte message-type
//! identifier (uint16 BE). The rest of the body is the handler payload.
//! Uses `bytes::Bytes` so the payload is a zero-copy slice of the body.
//!
//! # Example
//!
//! ```
//! use sessionwire::protocol::Message;
//!
//! let message = Message::new(1001, &b"hello"[..]);
//! let parsed = Message::parse(message.encode_body()).unwrap();
//!
//! assert_eq!(parsed.msg_id(), 1001);
//! assert_eq!(parsed.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{encode_frame_with_limit, MSG_ID_LENGTH};
use crate::error::{SessionwireError, Result};

/// A complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    msg_id: u16,
    payload: Bytes,
}

impl Message {
    /// Create a message from an identifier and payload.
    pub fn new(msg_id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_id,
            payload: payload.into(),
        }
    }

    /// Split a reassembled body into identifier and payload.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the body is too short to hold an identifier.
    pub fn parse(mut body: Bytes) -> Result<Self> {
        if body.len() < MSG_ID_LENGTH {
            return Err(SessionwireError::Protocol(format!(
                "body of {} bytes has no message id",
                body.len()
            )));
        }

        let msg_id = u16::from_be_bytes([body[0], body[1]]);
        let payload = body.split_off(MSG_ID_LENGTH);
        Ok(Self { msg_id, payload })
    }

    /// Get the message-type identifier.
    #[inline]
    pub fn msg_id(&self) -> u16 {
        self.msg_id
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Consume the message, returning identifier and payload.
    #[inline]
    pub fn into_parts(self) -> (u16, Bytes) {
        (self.msg_id, self.payload)
    }

    /// Encoded body length (identifier + payload).
    #[inline]
    pub fn body_len(&self) -> usize {
        MSG_ID_LENGTH + self.payload.len()
    }

    /// Encode the body (identifier + payload), without the length prefix.
    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.body_len());
        buf.put_u16(self.msg_id);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Encode a wire-ready frame (length prefix + body).
    pub fn to_frame(&self, max_body: usize) -> Result<Bytes> {
        encode_frame_with_limit(&self.encode_body(), max_body)
    }
}
