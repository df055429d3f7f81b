//! Logic module - hand-off from I/O tasks to the logic worker.
//!
//! Provides:
//! - [`LogicItem`] - one completed message plus the session it came from
//! - [`DispatchQueue`] - the mutex + condvar queue feeding the worker
//! - [`LogicSystem`] - owns the queue and the single worker thread
//! - [`LogicHandle`] - cheap clonable handle for posting items
//!
//! # Architecture
//!
//! ```text
//! Session read task ─┐
//! Session read task ─┼─► DispatchQueue ─► worker thread ─► CallbackRegistry ─► Handler
//! Session read task ─┘
//! ```
//!
//! Items from one session keep their arrival order; items from different
//! sessions interleave in lock-acquisition order.

mod queue;
mod system;

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::Message;
use crate::session::SessionHandle;

pub use queue::DispatchQueue;
pub use system::{LogicConfig, LogicSystem, WorkerStats, DEFAULT_THREAD_NAME};

/// A completed message waiting for dispatch.
#[derive(Debug)]
pub struct LogicItem {
    session: SessionHandle,
    msg_id: u16,
    payload: Bytes,
}

impl LogicItem {
    /// Pair a message with the session that received it.
    pub fn new(session: SessionHandle, message: Message) -> Self {
        let (msg_id, payload) = message.into_parts();
        Self {
            session,
            msg_id,
            payload,
        }
    }

    /// Originating session.
    #[inline]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Message-type identifier.
    #[inline]
    pub fn msg_id(&self) -> u16 {
        self.msg_id
    }

    /// Payload bytes (after the identifier).
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Posting handle for a running [`LogicSystem`].
#[derive(Clone)]
pub struct LogicHandle {
    queue: Arc<DispatchQueue>,
}

impl LogicHandle {
    /// Queue an item for the worker. Never blocks.
    ///
    /// # Errors
    ///
    /// - `QueueStopped` once the logic system is shutting down
    /// - `QueueFull` if a capacity is configured and reached
    pub fn post(&self, item: LogicItem) -> Result<()> {
        self.queue.post(item)
    }

    /// Check if the logic system has begun shutting down.
    pub fn is_stopped(&self) -> bool {
        self.queue.is_stopped()
    }

    /// Items currently waiting.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
