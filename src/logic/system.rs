//! Logic worker lifecycle.
//!
//! [`LogicSystem`] owns the dispatch queue and the single worker thread
//! that drains it. It is an explicit service object: construct it once at
//! startup with a filled [`CallbackRegistry`], hand [`LogicHandle`]s to
//! anything that posts, and call [`stop`](LogicSystem::stop) on shutdown.
//!
//! # Example
//!
//! ```
//! use sessionwire::handler::CallbackRegistry;
//! use sessionwire::logic::{LogicConfig, LogicSystem};
//!
//! let mut registry = CallbackRegistry::new();
//! registry.register(1, |_session, _id, _payload| Ok(())).unwrap();
//!
//! let logic = LogicSystem::start(registry, LogicConfig::default()).unwrap();
//! let handle = logic.handle();
//! // ... give `handle` to sessions ...
//! let stats = logic.stop();
//! assert_eq!(stats.processed, 0);
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::{DispatchQueue, LogicHandle};
use crate::error::Result;
use crate::handler::CallbackRegistry;

/// Default name of the worker thread.
pub const DEFAULT_THREAD_NAME: &str = "sessionwire-logic";

/// Configuration for the logic system.
#[derive(Debug, Clone)]
pub struct LogicConfig {
    /// Maximum queued items (`None` = unbounded).
    pub queue_capacity: Option<usize>,
    /// Worker thread name.
    pub thread_name: String,
}

impl Default for LogicConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// Counters reported by the worker when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items whose handler returned `Ok`.
    pub processed: u64,
    /// Items with no registered handler (discarded).
    pub unhandled: u64,
    /// Items whose handler returned an error or panicked.
    pub failed: u64,
}

impl WorkerStats {
    /// Total items taken off the queue.
    pub fn total(&self) -> u64 {
        self.processed + self.unhandled + self.failed
    }
}

/// The dispatch queue plus its worker thread.
pub struct LogicSystem {
    queue: Arc<DispatchQueue>,
    worker: Option<JoinHandle<WorkerStats>>,
}

impl LogicSystem {
    /// Spawn the worker thread.
    ///
    /// The registry moves into the worker; it cannot change afterwards.
    pub fn start(registry: CallbackRegistry, config: LogicConfig) -> Result<Self> {
        let queue = Arc::new(DispatchQueue::new(config.queue_capacity));

        let worker_queue = queue.clone();
        let worker = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_worker(&worker_queue, &registry))?;

        tracing::info!(
            "Logic worker '{}' started (queue capacity: {:?})",
            config.thread_name,
            config.queue_capacity
        );

        Ok(Self {
            queue,
            worker: Some(worker),
        })
    }

    /// Get a posting handle.
    pub fn handle(&self) -> LogicHandle {
        LogicHandle {
            queue: self.queue.clone(),
        }
    }

    /// Items currently waiting.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stop accepting items, drain the queue and join the worker.
    ///
    /// Blocks until every item posted before this call has been handled.
    pub fn stop(mut self) -> WorkerStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> WorkerStats {
        self.queue.stop();

        let Some(worker) = self.worker.take() else {
            return WorkerStats::default();
        };

        match worker.join() {
            Ok(stats) => {
                tracing::info!(
                    "Logic worker stopped ({} processed, {} unhandled, {} failed)",
                    stats.processed,
                    stats.unhandled,
                    stats.failed
                );
                stats
            }
            Err(panic) => {
                tracing::error!("Logic worker panicked: {}", panic_message(&*panic));
                WorkerStats::default()
            }
        }
    }
}

impl Drop for LogicSystem {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

/// Worker loop: pop, dispatch, repeat until stopped and drained.
fn run_worker(queue: &DispatchQueue, registry: &CallbackRegistry) -> WorkerStats {
    let mut stats = WorkerStats::default();

    while let Some(item) = queue.pop_blocking() {
        let msg_id = item.msg_id();
        if !registry.contains(msg_id) {
            tracing::debug!(
                "No handler for message {} from session {}, discarding",
                msg_id,
                item.session().id()
            );
            stats.unhandled += 1;
            continue;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            registry.dispatch(item.session(), msg_id, item.payload())
        }));

        match outcome {
            Ok(Ok(())) => stats.processed += 1,
            Ok(Err(e)) => {
                tracing::error!(
                    "Handler error for message {} from session {}: {}",
                    msg_id,
                    item.session().id(),
                    e
                );
                stats.failed += 1;
            }
            Err(panic) => {
                tracing::error!(
                    "Handler for message {} panicked: {}",
                    msg_id,
                    panic_message(&*panic)
                );
                stats.failed += 1;
            }
        }
    }

    stats
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
