//! Sessions: one live connection with its receive and send state.
//!
//! A [`Session`] binds a byte stream to its [`Reassembler`] and its writer
//! task, and bridges completed frames into the logic [`DispatchQueue`]
//! as [`LogicItem`]s.
//!
//! Sessions are shared as [`SessionHandle`] (`Arc<Session>`). The server's
//! session table, the read task, the writer task and every queued logic
//! item hold a clone, so the session outlives all pending work that
//! references it and is freed when the last clone drops.
//!
//! # Lifecycle
//!
//! ```text
//! Open ──drain()──► Draining ──queue flushed──► Closed
//!   └───────────────close()──────────────────────┘
//! ```
//!
//! [`drain`](Session::drain) stops reading and lets the writer flush every
//! frame already queued. [`close`](Session::close) aborts: queued frames are
//! dropped and a write blocked on a slow peer is cancelled. A drain that
//! does not finish within `close_timeout` is escalated to a close.
//!
//! [`DispatchQueue`]: crate::logic::DispatchQueue

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::codec::{JsonCodec, MsgPackCodec, PayloadCodec};
use crate::error::{SessionwireError, Result};
use crate::logic::{LogicHandle, LogicItem};
use crate::protocol::{Message, Reassembler, MAX_BODY};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default size of the per-read socket buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default time a draining session may spend flushing before it is closed.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session lifecycle state. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Reading and accepting sends.
    Open,
    /// No longer reading or accepting sends; flushing queued frames.
    Draining,
    /// Transport released.
    Closed,
}

/// Shared handle to a session.
pub type SessionHandle = Arc<Session>;

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum frame body length, in both directions.
    pub max_body: usize,
    /// Bytes requested from the socket per read.
    pub read_buffer_size: usize,
    /// Queued-but-unwritten frames allowed before `send` fails.
    pub max_pending_sends: usize,
    /// Close the session after this long without receiving a byte.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on flushing queued frames once draining starts.
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_body: MAX_BODY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_pending_sends: WriterConfig::default().max_pending_frames,
            idle_timeout: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// One live connection.
pub struct Session {
    id: String,
    peer_addr: Option<SocketAddr>,
    writer: WriterHandle,
    max_body: usize,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    /// Start a session over `stream`.
    ///
    /// Spawns the writer task and the session driver, which reads, reassembles
    /// and posts messages to `logic` until the peer disconnects, an error
    /// occurs or the session is drained or closed. The returned `JoinHandle`
    /// completes once the session has reached [`SessionState::Closed`].
    pub fn spawn<S>(
        stream: S,
        peer_addr: Option<SocketAddr>,
        config: &SessionConfig,
        logic: LogicHandle,
    ) -> (SessionHandle, JoinHandle<()>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);
        let (state_tx, state_rx) = watch::channel(SessionState::Open);

        let writer_config = WriterConfig {
            max_pending_frames: config.max_pending_sends,
        };
        let (writer, writer_task) = spawn_writer_task(write_half, writer_config, state_rx);

        let session = Arc::new(Session {
            id: Uuid::new_v4().to_string(),
            peer_addr,
            writer,
            max_body: config.max_body,
            state_tx,
        });

        tracing::debug!("Session {} opened (peer: {:?})", session.id, peer_addr);

        let watched = session.clone();
        tokio::spawn(async move {
            match writer_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Session {} write failed: {}", watched.id, e),
                Err(e) => tracing::error!("Session {} writer task aborted: {}", watched.id, e),
            }
            watched.close();
        });

        let driver = session.clone();
        let config = config.clone();
        let task = tokio::spawn(async move {
            match read_loop(&driver, reader, &config, &logic).await {
                Ok(()) => {
                    tracing::debug!("Session {} read side finished", driver.id);
                    driver.drain();
                }
                Err(e) => {
                    tracing::warn!("Session {} closed with error: {}", driver.id, e);
                    driver.close();
                }
            }

            if tokio::time::timeout(config.close_timeout, driver.closed())
                .await
                .is_err()
            {
                tracing::warn!(
                    "Session {} did not flush within {:?}, closing",
                    driver.id,
                    config.close_timeout
                );
                driver.close();
            }
        });

        (session, task)
    }

    /// A session with no transport behind it.
    ///
    /// Every send fails with `SessionClosed`. Useful for driving handlers
    /// directly without a socket.
    pub fn detached(id: impl Into<String>) -> SessionHandle {
        let (state_tx, _) = watch::channel(SessionState::Closed);
        Arc::new(Session {
            id: id.into(),
            peer_addr: None,
            writer: WriterHandle::disconnected(),
            max_body: MAX_BODY,
            state_tx,
        })
    }

    /// Unique session identifier.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remote address, if known.
    #[inline]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Send a message (identifier + payload) to the peer.
    ///
    /// Never blocks: the frame is queued behind earlier sends and written by
    /// the session's writer task.
    pub fn send(&self, msg_id: u16, payload: impl AsRef<[u8]>) -> Result<()> {
        let message = Message::new(msg_id, bytes::Bytes::copy_from_slice(payload.as_ref()));
        self.enqueue(OutboundFrame::message(&message, self.max_body)?)
    }

    /// Send a raw frame body, without adding an identifier.
    pub fn send_body(&self, body: &[u8]) -> Result<()> {
        self.enqueue(OutboundFrame::encode(body, self.max_body)?)
    }

    /// Serialize `value` as JSON and send it under `msg_id`.
    pub fn send_json<T: Serialize>(&self, msg_id: u16, value: &T) -> Result<()> {
        self.send(msg_id, JsonCodec::encode(value)?)
    }

    /// Serialize `value` as MsgPack and send it under `msg_id`.
    pub fn send_msgpack<T: Serialize>(&self, msg_id: u16, value: &T) -> Result<()> {
        self.send(msg_id, MsgPackCodec::encode(value)?)
    }

    fn enqueue(&self, frame: OutboundFrame) -> Result<()> {
        if self.is_closed() {
            return Err(SessionwireError::SessionClosed);
        }
        self.writer.send(frame)
    }

    /// Stop reading and close once every queued frame has been written.
    ///
    /// Later sends fail with `SessionClosed`. No-op unless the session is open.
    pub fn drain(&self) {
        let started = self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Open {
                *state = SessionState::Draining;
                true
            } else {
                false
            }
        });
        if started {
            tracing::debug!("Session {} draining", self.id);
        }
    }

    /// Close the session immediately. Idempotent.
    ///
    /// Stops the read loop and the writer task, cancelling any write in
    /// progress; frames not yet written are abandoned.
    pub fn close(&self) {
        let was = self.state_tx.send_replace(SessionState::Closed);
        if was != SessionState::Closed {
            tracing::debug!("Session {} closed", self.id);
        }
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Check if the session no longer accepts sends (draining or closed).
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state() != SessionState::Open
    }

    /// Wait until the session reaches [`SessionState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.state_tx.subscribe();
        wait_for_state(&mut rx, SessionState::Closed).await;
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_sends(&self) -> usize {
        self.writer.pending_count()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Resolve once the state has reached `target` (or its sender is gone).
pub(crate) async fn wait_for_state(rx: &mut watch::Receiver<SessionState>, target: SessionState) {
    while *rx.borrow_and_update() < target {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Read, reassemble and post until EOF, drain, close or error.
async fn read_loop<R>(
    session: &SessionHandle,
    mut reader: R,
    config: &SessionConfig,
    logic: &LogicHandle,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reassembler = Reassembler::with_max_body(config.max_body);
    let mut buf = vec![0u8; config.read_buffer_size];
    let mut bodies = Vec::new();
    let mut state = session.state_tx.subscribe();

    loop {
        let n = tokio::select! {
            biased;
            _ = wait_for_state(&mut state, SessionState::Draining) => return Ok(()),
            read = read_chunk(&mut reader, &mut buf, config.idle_timeout) => read?,
        };

        if n == 0 {
            return Ok(());
        }

        let fed = reassembler.feed_into(&buf[..n], &mut bodies);

        for body in bodies.drain(..) {
            let message = Message::parse(body)?;
            let item = LogicItem::new(session.clone(), message);
            match logic.post(item) {
                Ok(()) => {}
                Err(SessionwireError::QueueFull { capacity }) => {
                    tracing::warn!(
                        "Dispatch queue full (capacity {}), dropping message from session {}",
                        capacity,
                        session.id
                    );
                }
                Err(SessionwireError::QueueStopped) => {
                    tracing::debug!("Logic stopped, session {} stops reading", session.id);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        fed?;
    }
}

async fn read_chunk<R>(reader: &mut R, buf: &mut [u8], idle_timeout: Option<Duration>) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(timeout) => tokio::time::timeout(timeout, reader.read(buf))
            .await
            .map_err(|_| SessionwireError::IdleTimeout(timeout))?
            .map_err(SessionwireError::from),
        None => Ok(reader.read(buf).await?),
    }
}
