//! Per-session send serializer.
//!
//! Every session owns one dedicated writer task that receives wire-ready
//! frames over an mpsc channel. The task is the only code touching the
//! write half, so exactly one write is in flight at a time and frames hit
//! the wire in the order `send` was called, never interleaved.
//!
//! # Architecture
//!
//! ```text
//! Handler (logic thread) ─┐
//! Handler (logic thread) ─┼─► mpsc::UnboundedSender<OutboundFrame> ─► Writer Task ─► Socket
//! Read loop (I/O task)   ─┘
//! ```
//!
//! Frames already waiting in the channel are coalesced into one vectored
//! write; batching never reorders them. A failed write ends the task and
//! abandons everything still queued.
//!
//! The task follows the session state: on `Draining` it stops accepting new
//! frames, writes out everything already queued and shuts the write half
//! down. On `Closed` it returns at once, even mid-write, dropping the write
//! half and whatever is still queued.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::backpressure::{BackpressureController, DEFAULT_MAX_PENDING};
use crate::error::{SessionwireError, Result};
use crate::protocol::{encode_frame_with_limit, Message};
use crate::session::{wait_for_state, SessionState};

/// Default maximum pending frames before sends are rejected.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = DEFAULT_MAX_PENDING;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written: length prefix and body in one buffer.
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    wire: Bytes,
}

impl OutboundFrame {
    /// Frame a raw body, rejecting bodies above `max_body`.
    pub fn encode(body: &[u8], max_body: usize) -> Result<Self> {
        Ok(Self {
            wire: encode_frame_with_limit(body, max_body)?,
        })
    }

    /// Frame a message (identifier + payload).
    pub fn message(message: &Message, max_body: usize) -> Result<Self> {
        Ok(Self {
            wire: message.to_frame(max_body)?,
        })
    }

    /// The wire bytes (header + body).
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.wire
    }

    /// Total size of this frame (header + body).
    #[inline]
    pub fn size(&self) -> usize {
        self.wire.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum queued-but-unwritten frames before `send` fails.
    pub max_pending_frames: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
        }
    }
}

/// Handle for queueing frames on a session's writer task.
///
/// Cheap to clone; `send` is synchronous and never blocks, so it can be
/// called from the logic worker thread as well as from async tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    budget: BackpressureController,
}

impl WriterHandle {
    /// Queue a frame behind everything already queued.
    ///
    /// # Errors
    ///
    /// - `SessionClosed` if the writer task has stopped
    /// - `SendQueueFull` if `max_pending_frames` frames are still unwritten
    pub fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.tx.is_closed() {
            return Err(SessionwireError::SessionClosed);
        }

        self.budget.try_reserve()?;

        self.tx.send(frame).map_err(|_| {
            self.budget.release();
            SessionwireError::SessionClosed
        })
    }

    /// Check if the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.budget.is_active()
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.budget.pending_count()
    }

    /// A handle with no writer task behind it; every send fails.
    pub(crate) fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            tx,
            budget: BackpressureController::new(DEFAULT_MAX_PENDING_FRAMES),
        }
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends when every handle is dropped, when `state` reaches
/// `Draining` and the queue is flushed, when it reaches `Closed`, or with
/// an error when a write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    state: watch::Receiver<SessionState>,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let budget = BackpressureController::new(config.max_pending_frames);

    let handle = WriterHandle {
        tx,
        budget: budget.clone(),
    };

    let task = tokio::spawn(writer_loop(rx, writer, budget, state));

    (handle, task)
}

/// Main writer loop - receives frames and writes them in FIFO order.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    mut writer: W,
    budget: BackpressureController,
    mut state: watch::Receiver<SessionState>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut draining = false;

    loop {
        let first = if draining {
            // Channel is closed: yields what is buffered, then `None`.
            match rx.recv().await {
                Some(frame) => frame,
                None => break,
            }
        } else {
            tokio::select! {
                biased;
                _ = wait_for_state(&mut state, SessionState::Draining) => {
                    if *state.borrow() == SessionState::Closed {
                        return Ok(());
                    }
                    rx.close();
                    draining = true;
                    continue;
                }
                frame = rx.recv() => match frame {
                    Some(f) => f,
                    None => break,
                },
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let result = tokio::select! {
            biased;
            _ = wait_for_state(&mut state, SessionState::Closed) => {
                budget.release_many(batch_size);
                return Ok(());
            }
            result = write_batch(&mut writer, &batch) => result,
        };
        budget.release_many(batch_size);
        result?;
    }

    // Stop accepting frames before the write half goes away.
    rx.close();
    let _ = writer.shutdown().await;
    Ok(())
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(SessionwireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after the first `skip_bytes` bytes.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.wire[start..]));
        }
        offset = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Reassembler, HEAD_LENGTH, MAX_BODY};
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(body: &[u8]) -> OutboundFrame {
        OutboundFrame::encode(body, MAX_BODY).unwrap()
    }

    #[test]
    fn test_outbound_frame_creation() {
        let f = frame(b"hello");
        assert_eq!(f.size(), HEAD_LENGTH + 5);
        assert_eq!(&f.as_bytes()[HEAD_LENGTH..], b"hello");
    }

    #[test]
    fn test_outbound_frame_rejects_oversize() {
        let result = OutboundFrame::encode(&[0u8; 11], 10);
        assert!(matches!(result, Err(SessionwireError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_build_remaining_slices() {
        let batch = vec![frame(b"abc"), frame(b"defg")];

        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);

        // Inside the first frame's header
        let slices = build_remaining_slices(&batch, 1);
        assert_eq!(slices[0].len(), 4);
        assert_eq!(slices[1].len(), 6);

        // First frame fully written
        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), 6);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|_| frame(b"abc")).collect();

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner().len(), 5 * (HEAD_LENGTH + 3));
    }

    #[tokio::test]
    async fn test_writer_preserves_send_order() {
        let (client, mut server) = duplex(64);
        let (_state_tx, state_rx) = watch::channel(SessionState::Open);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default(), state_rx);

        // Sent from a plain thread, like a handler on the logic worker
        let sender = handle.clone();
        std::thread::spawn(move || {
            for i in 0..200u32 {
                sender.send(frame(&i.to_be_bytes())).unwrap();
            }
        })
        .join()
        .unwrap();

        let mut reassembler = Reassembler::new();
        let mut bodies = Vec::new();
        let mut buf = [0u8; 37];
        while bodies.len() < 200 {
            let n = server.read(&mut buf).await.unwrap();
            assert!(n > 0);
            bodies.extend(reassembler.feed(&buf[..n]).unwrap());
        }

        for (i, body) in bodies.iter().enumerate() {
            assert_eq!(&body[..], &(i as u32).to_be_bytes());
        }
    }

    #[tokio::test]
    async fn test_pending_count_drains() {
        let (client, mut server) = duplex(4096);
        let (_state_tx, state_rx) = watch::channel(SessionState::Open);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default(), state_rx);

        handle.send(frame(b"one")).unwrap();
        handle.send(frame(b"two")).unwrap();

        let mut buf = vec![0u8; 64];
        let mut read = 0;
        while read < 2 * (HEAD_LENGTH + 3) {
            read += server.read(&mut buf[read..]).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.pending_count(), 0);
        assert!(!handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_send_queue_full() {
        // Nobody reads the peer, so the 8-byte duplex buffer stalls the writer
        let (client, _server) = duplex(8);
        let (_state_tx, state_rx) = watch::channel(SessionState::Open);
        let config = WriterConfig {
            max_pending_frames: 4,
        };
        let (handle, _task) = spawn_writer_task(client, config, state_rx);

        let results: Vec<_> = (0..10).map(|_| handle.send(frame(b"payload"))).collect();

        assert!(results[..4].iter().all(|r| r.is_ok()));
        assert!(matches!(
            results.last(),
            Some(Err(SessionwireError::SendQueueFull))
        ));
    }

    #[tokio::test]
    async fn test_writer_stops_on_close_signal() {
        let (client, _server) = duplex(4096);
        let (state_tx, state_rx) = watch::channel(SessionState::Open);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), state_rx);

        state_tx.send_replace(SessionState::Closed);

        assert!(task.await.unwrap().is_ok());
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(frame(b"late")),
            Err(SessionwireError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_cancels_blocked_write() {
        // The peer never reads, so a 2000-byte frame cannot fit in 64 bytes
        let (client, _server) = duplex(64);
        let (state_tx, state_rx) = watch::channel(SessionState::Open);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), state_rx);

        handle.send(frame(&[0xAA; 2000])).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.pending_count(), 1);

        state_tx.send_replace(SessionState::Closed);

        let finished = tokio::time::timeout(Duration::from_millis(500), task).await;
        assert!(finished.unwrap().unwrap().is_ok());
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_drain_flushes_queued_frames() {
        let (client, mut server) = duplex(64);
        let (state_tx, state_rx) = watch::channel(SessionState::Open);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), state_rx);

        for i in 0..50u32 {
            handle.send(frame(&i.to_be_bytes())).unwrap();
        }
        state_tx.send_replace(SessionState::Draining);

        // Everything queued before the drain still reaches the peer, then EOF
        let mut wire = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), server.read_to_end(&mut wire))
            .await
            .unwrap()
            .unwrap();
        let bodies = Reassembler::new().feed(&wire).unwrap();
        assert_eq!(bodies.len(), 50);
        assert_eq!(&bodies[49][..], &49u32.to_be_bytes());

        assert!(task.await.unwrap().is_ok());
        assert!(matches!(
            handle.send(frame(b"late")),
            Err(SessionwireError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_handle_drop() {
        let (client, _server) = duplex(4096);
        let (_state_tx, state_rx) = watch::channel(SessionState::Open);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), state_rx);

        drop(handle);

        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_write_failure_ends_task() {
        let (client, server) = duplex(64);
        drop(server);
        let (_state_tx, state_rx) = watch::channel(SessionState::Open);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), state_rx);

        handle.send(frame(b"into the void")).unwrap();

        assert!(task.await.unwrap().is_err());
    }

    #[test]
    fn test_disconnected_handle_rejects_sends() {
        let handle = WriterHandle::disconnected();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(frame(b"x")),
            Err(SessionwireError::SessionClosed)
        ));
    }
}
