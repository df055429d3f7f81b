//! Per-session receive reassembler.
//!
//! Turns an arbitrarily fragmented byte stream into complete frame bodies.
//! Implements a two-phase state machine:
//! - `AwaitingHeader`: collecting the 2-byte length prefix
//! - `AwaitingBody`: length decoded, collecting `length` body bytes
//!
//! Chunk boundaries never need to line up with frame boundaries. One chunk
//! can complete many frames, or leave the machine mid-header or mid-body.
//!
//! # Example
//!
//! ```
//! use sessionwire::protocol::{encode_frame, Reassembler};
//!
//! let mut reassembler = Reassembler::new();
//! let wire = encode_frame(b"hello").unwrap();
//!
//! assert!(reassembler.feed(&wire[..3]).unwrap().is_empty());
//! let bodies = reassembler.feed(&wire[3..]).unwrap();
//! assert_eq!(&bodies[0][..], b"hello");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{decode_length, HEAD_LENGTH, MAX_BODY};
use crate::error::{SessionwireError, Result};

/// Reassembly phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Collecting the length prefix.
    AwaitingHeader,
    /// Length prefix parsed, collecting the body.
    AwaitingBody,
}

/// Partial receive state for one session.
#[derive(Debug)]
pub struct Reassembler {
    phase: Phase,
    /// Length prefix bytes collected so far (target: `HEAD_LENGTH`).
    head_buf: BytesMut,
    /// Body bytes collected so far (target: `body_len`).
    body_buf: BytesMut,
    /// Decoded length of the body being collected.
    body_len: usize,
    max_body: usize,
    failed: bool,
}

impl Reassembler {
    /// Create a reassembler with the default [`MAX_BODY`].
    pub fn new() -> Self {
        Self::with_max_body(MAX_BODY)
    }

    /// Create a reassembler with a custom body limit.
    pub fn with_max_body(max_body: usize) -> Self {
        Self {
            phase: Phase::AwaitingHeader,
            head_buf: BytesMut::with_capacity(HEAD_LENGTH),
            body_buf: BytesMut::new(),
            body_len: 0,
            max_body,
            failed: false,
        }
    }

    /// Feed a chunk and return every body it completed.
    ///
    /// Bodies completed before a protocol violation in the same chunk are
    /// discarded along with the error; use [`feed_into`](Self::feed_into)
    /// to keep them.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        let mut bodies = Vec::new();
        self.feed_into(chunk, &mut bodies)?;
        Ok(bodies)
    }

    /// Feed a chunk, appending completed bodies to `out` in stream order.
    ///
    /// # Errors
    ///
    /// Returns `FrameTooLarge` when a header decodes to more than the body
    /// limit. The reassembler is then poisoned and every later call fails.
    pub fn feed_into(&mut self, mut chunk: &[u8], out: &mut Vec<Bytes>) -> Result<()> {
        if self.failed {
            return Err(SessionwireError::Protocol(
                "reassembler is in a failed state".to_string(),
            ));
        }

        while !chunk.is_empty() {
            match self.phase {
                Phase::AwaitingHeader => {
                    let take = (HEAD_LENGTH - self.head_buf.len()).min(chunk.len());
                    self.head_buf.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];

                    if self.head_buf.len() < HEAD_LENGTH {
                        continue;
                    }

                    let length = decode_length([self.head_buf[0], self.head_buf[1]]) as usize;
                    self.head_buf.clear();

                    if length > self.max_body {
                        self.failed = true;
                        return Err(SessionwireError::FrameTooLarge {
                            length,
                            max: self.max_body,
                        });
                    }

                    if length == 0 {
                        out.push(Bytes::new());
                        continue;
                    }

                    self.body_buf.reserve(length);
                    self.body_len = length;
                    self.phase = Phase::AwaitingBody;
                }

                Phase::AwaitingBody => {
                    let take = (self.body_len - self.body_buf.len()).min(chunk.len());
                    self.body_buf.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];

                    if self.body_buf.len() == self.body_len {
                        out.push(self.body_buf.split().freeze());
                        self.body_len = 0;
                        self.phase = Phase::AwaitingHeader;
                    }
                }
            }
        }

        Ok(())
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Bytes placed into the buffer currently being filled.
    #[inline]
    pub fn received(&self) -> usize {
        match self.phase {
            Phase::AwaitingHeader => self.head_buf.len(),
            Phase::AwaitingBody => self.body_buf.len(),
        }
    }

    /// Decoded length of the body in progress, if any.
    #[inline]
    pub fn expected_body_len(&self) -> Option<usize> {
        match self.phase {
            Phase::AwaitingHeader => None,
            Phase::AwaitingBody => Some(self.body_len),
        }
    }

    /// Check whether a protocol violation has been seen.
    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Maximum accepted body length.
    #[inline]
    pub fn max_body(&self) -> usize {
        self.max_body
    }

    /// Drop any partial state, including a previous failure.
    pub fn reset(&mut self) {
        self.head_buf.clear();
        self.body_buf.clear();
        self.body_len = 0;
        self.phase = Phase::AwaitingHeader;
        self.failed = false;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, encode_length};

    #[test]
    fn test_single_complete_frame() {
        let mut reassembler = Reassembler::new();
        let bodies = reassembler.feed(&encode_frame(b"hello").unwrap()).unwrap();

        assert_eq!(bodies.len(), 1);
        assert_eq!(&bodies[0][..], b"hello");
        assert_eq!(reassembler.phase(), Phase::AwaitingHeader);
        assert_eq!(reassembler.received(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut reassembler = Reassembler::new();

        let mut combined = Vec::new();
        combined.extend_from_slice(&encode_frame(b"first").unwrap());
        combined.extend_from_slice(&encode_frame(b"second").unwrap());
        combined.extend_from_slice(&encode_frame(b"third").unwrap());

        let bodies = reassembler.feed(&combined).unwrap();

        assert_eq!(bodies.len(), 3);
        assert_eq!(&bodies[0][..], b"first");
        assert_eq!(&bodies[1][..], b"second");
        assert_eq!(&bodies[2][..], b"third");
    }

    #[test]
    fn test_split_inside_header() {
        let mut reassembler = Reassembler::new();
        let wire = encode_frame(b"test").unwrap();

        assert!(reassembler.feed(&wire[..1]).unwrap().is_empty());
        assert_eq!(reassembler.phase(), Phase::AwaitingHeader);
        assert_eq!(reassembler.received(), 1);

        let bodies = reassembler.feed(&wire[1..]).unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(&bodies[0][..], b"test");
    }

    #[test]
    fn test_split_inside_body() {
        let mut reassembler = Reassembler::new();
        let body = b"this is a longer body that will be fragmented";
        let wire = encode_frame(body).unwrap();

        let partial = HEAD_LENGTH + 10;
        assert!(reassembler.feed(&wire[..partial]).unwrap().is_empty());
        assert_eq!(reassembler.phase(), Phase::AwaitingBody);
        assert_eq!(reassembler.received(), 10);
        assert_eq!(reassembler.expected_body_len(), Some(body.len()));

        let bodies = reassembler.feed(&wire[partial..]).unwrap();
        assert_eq!(&bodies[0][..], body);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut reassembler = Reassembler::new();
        let wire = encode_frame(b"hi there").unwrap();

        let mut all = Vec::new();
        for byte in wire.iter() {
            all.extend(reassembler.feed(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(&all[0][..], b"hi there");
    }

    #[test]
    fn test_zero_length_body() {
        let mut reassembler = Reassembler::new();
        let bodies = reassembler.feed(&encode_frame(&[]).unwrap()).unwrap();

        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].is_empty());
        assert_eq!(reassembler.phase(), Phase::AwaitingHeader);
    }

    #[test]
    fn test_zero_length_between_frames() {
        let mut reassembler = Reassembler::new();

        let mut combined = Vec::new();
        combined.extend_from_slice(&encode_frame(b"a").unwrap());
        combined.extend_from_slice(&encode_frame(&[]).unwrap());
        combined.extend_from_slice(&encode_frame(b"b").unwrap());

        let bodies = reassembler.feed(&combined).unwrap();
        assert_eq!(bodies.len(), 3);
        assert!(bodies[1].is_empty());
        assert_eq!(&bodies[2][..], b"b");
    }

    #[test]
    fn test_oversize_rejected_without_frame() {
        let mut reassembler = Reassembler::with_max_body(100);
        let header = encode_length(1000);

        let mut out = Vec::new();
        let err = reassembler.feed_into(&header, &mut out).unwrap_err();

        assert!(out.is_empty());
        assert!(matches!(
            err,
            SessionwireError::FrameTooLarge { length: 1000, max: 100 }
        ));
        assert!(reassembler.is_failed());
    }

    #[test]
    fn test_failed_reassembler_rejects_further_input() {
        let mut reassembler = Reassembler::with_max_body(4);
        assert!(reassembler.feed(&encode_length(5)).is_err());

        let err = reassembler.feed(&encode_frame(b"ok").unwrap()).unwrap_err();
        assert!(err.to_string().contains("failed state"));
    }

    #[test]
    fn test_frames_before_violation_are_kept() {
        let mut reassembler = Reassembler::with_max_body(16);

        let mut chunk = encode_frame(b"good").unwrap().to_vec();
        chunk.extend_from_slice(&encode_length(17));

        let mut out = Vec::new();
        assert!(reassembler.feed_into(&chunk, &mut out).is_err());
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], b"good");
    }

    #[test]
    fn test_exactly_max_body_accepted() {
        let mut reassembler = Reassembler::new();
        let body = vec![0xAB; MAX_BODY];

        let bodies = reassembler.feed(&encode_frame(&body).unwrap()).unwrap();
        assert_eq!(bodies[0].len(), MAX_BODY);
    }

    #[test]
    fn test_reset_clears_partial_state() {
        let mut reassembler = Reassembler::new();
        let wire = encode_frame(b"test").unwrap();

        reassembler.feed(&wire[..HEAD_LENGTH + 1]).unwrap();
        assert_eq!(reassembler.phase(), Phase::AwaitingBody);

        reassembler.reset();
        assert_eq!(reassembler.phase(), Phase::AwaitingHeader);
        assert_eq!(reassembler.received(), 0);

        let bodies = reassembler.feed(&wire).unwrap();
        assert_eq!(&bodies[0][..], b"test");
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut reassembler = Reassembler::new();
        let first = encode_frame(b"first").unwrap();
        let second = encode_frame(b"second").unwrap();

        let mut data = first.to_vec();
        data.extend_from_slice(&second[..4]);

        let bodies = reassembler.feed(&data).unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(reassembler.phase(), Phase::AwaitingBody);

        let bodies = reassembler.feed(&second[4..]).unwrap();
        assert_eq!(&bodies[0][..], b"second");
    }
}
