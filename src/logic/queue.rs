//! Dispatch queue between the I/O tasks and the logic worker.
//!
//! A mutex-guarded FIFO with a condition variable for the single consumer.
//! Producers never block: `post` appends and wakes the worker. Once
//! [`stop`](DispatchQueue::stop) is called, new items are rejected with
//! `QueueStopped`, but items already queued are still handed out until the
//! queue is empty.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::LogicItem;
use crate::error::{SessionwireError, Result};

struct QueueState {
    items: VecDeque<LogicItem>,
    stopped: bool,
}

/// Thread-safe queue of logic items.
pub struct DispatchQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    /// `None` means unbounded.
    capacity: Option<usize>,
}

impl DispatchQueue {
    /// Create a queue, optionally bounded to `capacity` items.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                stopped: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append an item and wake the worker.
    ///
    /// # Errors
    ///
    /// - `QueueStopped` once shutdown has begun
    /// - `QueueFull` if the queue is bounded and at capacity; the item is dropped
    pub fn post(&self, item: LogicItem) -> Result<()> {
        let mut state = self.state.lock();

        if state.stopped {
            return Err(SessionwireError::QueueStopped);
        }

        if let Some(capacity) = self.capacity {
            if state.items.len() >= capacity {
                return Err(SessionwireError::QueueFull { capacity });
            }
        }

        state.items.push_back(item);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available.
    ///
    /// Returns `None` only when the queue is stopped and fully drained.
    pub fn pop_blocking(&self) -> Option<LogicItem> {
        let mut state = self.state.lock();

        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.stopped {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Take an item if one is queued, without waiting.
    pub fn try_pop(&self) -> Option<LogicItem> {
        self.state.lock().items.pop_front()
    }

    /// Reject new items and wake every waiter.
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.available.notify_all();
    }

    /// Check if shutdown has begun.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Configured capacity (`None` = unbounded).
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;
    use crate::session::Session;
    use std::sync::Arc;
    use std::time::Duration;

    fn item(msg_id: u16, payload: &'static [u8]) -> LogicItem {
        LogicItem::new(Session::detached("q"), Message::new(msg_id, payload))
    }

    #[test]
    fn test_fifo_order() {
        let queue = DispatchQueue::default();

        queue.post(item(1, b"a")).unwrap();
        queue.post(item(2, b"b")).unwrap();
        queue.post(item(3, b"c")).unwrap();
        assert_eq!(queue.len(), 3);

        let ids: Vec<u16> = (0..3).map(|_| queue.try_pop().unwrap().msg_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stop_rejects_new_items_but_keeps_queued() {
        let queue = DispatchQueue::default();
        queue.post(item(1, b"before")).unwrap();

        queue.stop();
        assert!(queue.is_stopped());
        assert!(matches!(
            queue.post(item(2, b"after")),
            Err(SessionwireError::QueueStopped)
        ));

        assert_eq!(queue.pop_blocking().map(|i| i.msg_id()), Some(1));
        assert!(queue.pop_blocking().is_none());
    }

    #[test]
    fn test_bounded_queue_rejects_when_full() {
        let queue = DispatchQueue::new(Some(2));

        queue.post(item(1, b"")).unwrap();
        queue.post(item(2, b"")).unwrap();

        assert!(matches!(
            queue.post(item(3, b"")),
            Err(SessionwireError::QueueFull { capacity: 2 })
        ));

        queue.try_pop().unwrap();
        assert!(queue.post(item(3, b"")).is_ok());
        assert_eq!(queue.capacity(), Some(2));
    }

    #[test]
    fn test_pop_blocking_wakes_on_post() {
        let queue = Arc::new(DispatchQueue::default());

        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop_blocking().map(|i| i.msg_id()))
        };

        std::thread::sleep(Duration::from_millis(20));
        queue.post(item(42, b"wake")).unwrap();

        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_pop_blocking_wakes_on_stop() {
        let queue = Arc::new(DispatchQueue::default());

        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop_blocking().is_none())
        };

        std::thread::sleep(Duration::from_millis(20));
        queue.stop();

        assert!(consumer.join().unwrap());
    }
}
