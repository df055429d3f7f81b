//! Protocol module - wire format, reassembly, and message layout.
//!
//! This module implements the binary protocol spoken on every session:
//! - 2-byte length prefix encoding/decoding
//! - Reassembler for turning fragmented reads into frame bodies
//! - Message struct splitting a body into identifier and payload

mod message;
mod reassembler;
mod wire_format;

pub use message::Message;
pub use reassembler::{Phase, Reassembler};
pub use wire_format::{
    decode_length, encode_frame, encode_frame_with_limit, encode_length, HEAD_LENGTH, MAX_BODY,
    MSG_ID_LENGTH,
};
