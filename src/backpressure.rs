//! Backpressure accounting for a session's send queue.
//!
//! Handlers run on the logic worker thread, so `send` must never block.
//! The [`BackpressureController`] counts frames that have been queued but
//! not yet written; once the count reaches `max_pending`, further sends
//! are rejected immediately with `SendQueueFull` instead of growing the
//! queue without bound.
//!
//! The writer task releases slots after each batch hits the socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{SessionwireError, Result};

/// Default maximum pending frames per session.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Lock-free pending-frame counter with a hard cap.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl BackpressureController {
    /// Create a new controller with the given limit.
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
        }
    }

    /// Check if we can accept more frames.
    #[inline]
    pub fn can_accept(&self) -> bool {
        self.pending.load(Ordering::Acquire) < self.max_pending
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.can_accept()
    }

    /// Get current pending count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Get maximum pending limit.
    #[inline]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Get available capacity.
    #[inline]
    pub fn available_capacity(&self) -> usize {
        self.max_pending.saturating_sub(self.pending_count())
    }

    /// Reserve a slot, failing with `SendQueueFull` at capacity.
    pub fn try_reserve(&self) -> Result<()> {
        let max = self.max_pending;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .map(|_| ())
            .map_err(|_| SessionwireError::SendQueueFull)
    }

    /// Release a slot.
    #[inline]
    pub fn release(&self) {
        self.release_many(1);
    }

    /// Release multiple slots at once (after a batch write).
    #[inline]
    pub fn release_many(&self, count: usize) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(count))
            });
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_creation() {
        let ctrl = BackpressureController::new(100);
        assert_eq!(ctrl.max_pending(), 100);
        assert_eq!(ctrl.pending_count(), 0);
        assert!(ctrl.can_accept());
        assert!(!ctrl.is_active());
    }

    #[test]
    fn test_controller_default() {
        let ctrl = BackpressureController::default();
        assert_eq!(ctrl.max_pending(), DEFAULT_MAX_PENDING);
    }

    #[test]
    fn test_try_reserve_at_capacity() {
        let ctrl = BackpressureController::new(5);

        for _ in 0..5 {
            ctrl.try_reserve().unwrap();
        }
        assert!(ctrl.is_active());

        let result = ctrl.try_reserve();
        assert!(matches!(result, Err(SessionwireError::SendQueueFull)));
        assert_eq!(ctrl.pending_count(), 5);
    }

    #[test]
    fn test_release() {
        let ctrl = BackpressureController::new(10);

        ctrl.try_reserve().unwrap();
        ctrl.try_reserve().unwrap();
        assert_eq!(ctrl.pending_count(), 2);

        ctrl.release();
        assert_eq!(ctrl.pending_count(), 1);
    }

    #[test]
    fn test_release_many_saturates() {
        let ctrl = BackpressureController::new(100);

        for _ in 0..50 {
            ctrl.try_reserve().unwrap();
        }
        ctrl.release_many(30);
        assert_eq!(ctrl.pending_count(), 20);
        assert_eq!(ctrl.available_capacity(), 80);

        ctrl.release_many(1000);
        assert_eq!(ctrl.pending_count(), 0);
    }

    #[test]
    fn test_clone_shares_state() {
        let ctrl1 = BackpressureController::new(10);
        let ctrl2 = ctrl1.clone();

        ctrl1.try_reserve().unwrap();
        assert_eq!(ctrl2.pending_count(), 1);
    }

    #[test]
    fn test_concurrent_reserve_never_exceeds_limit() {
        let ctrl = BackpressureController::new(100);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let ctrl = ctrl.clone();
                std::thread::spawn(move || (0..50).filter(|_| ctrl.try_reserve().is_ok()).count())
            })
            .collect();

        let accepted: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();
        assert_eq!(accepted, 100);
        assert_eq!(ctrl.pending_count(), 100);
    }
}
