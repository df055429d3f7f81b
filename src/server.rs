//! TCP server builder and runtime.
//!
//! The [`ServerBuilder`] provides a fluent API for configuring limits and
//! registering handlers. The [`Server`] manages the lifecycle:
//! 1. Bind the listener
//! 2. Start the logic worker
//! 3. Accept connections and spawn a [`Session`] per socket
//! 4. On shutdown, stop accepting, drain the logic worker, then drain every
//!    session so replies queued by the last handlers still reach their peers
//!
//! # Example
//!
//! ```no_run
//! use serde::Deserialize;
//! use sessionwire::Server;
//!
//! #[derive(Deserialize)]
//! struct Hello {
//!     data: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .listen_addr("127.0.0.1:10086")
//!         .handle_json(1001, |session, hello: Hello| session.send(1001, hello.data))
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::{SessionwireError, Result};
use crate::handler::{CallbackRegistry, Handler, HandlerResult};
use crate::logic::{LogicHandle, LogicSystem, WorkerStats};
use crate::session::{Session, SessionConfig, SessionHandle};

/// Pause after a failed `accept` before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

type SessionTable = Arc<DashMap<String, SessionHandle>>;

/// Builder for configuring and starting a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    registry: CallbackRegistry,
    /// First registration failure; reported by `start`.
    registration_error: Option<SessionwireError>,
}

impl ServerBuilder {
    /// Create a builder with default configuration and no handlers.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            registry: CallbackRegistry::new(),
            registration_error: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the listen address (`host:port`).
    ///
    /// Default: `127.0.0.1:10086`
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum frame body length.
    ///
    /// Default: 2048
    pub fn max_body(mut self, max_body: usize) -> Self {
        self.config.max_body = max_body;
        self
    }

    /// Set the per-read socket buffer size.
    ///
    /// Default: 1024
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Close sessions that receive nothing for `timeout`.
    ///
    /// Rounded up to whole milliseconds; a zero timeout is rejected by `start`.
    /// Default: disabled
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_ms = Some(ceil_millis(timeout));
        self
    }

    /// Bound the time a draining session may spend flushing queued frames.
    ///
    /// Default: 5 seconds
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout_ms = ceil_millis(timeout);
        self
    }

    /// Set the per-session limit on queued outbound frames.
    ///
    /// Default: 1024
    pub fn max_pending_sends(mut self, limit: usize) -> Self {
        self.config.max_pending_sends = limit;
        self
    }

    /// Bound the dispatch queue. Messages arriving while it is full are
    /// dropped with a warning.
    ///
    /// Default: unbounded
    pub fn dispatch_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.dispatch_queue_capacity = Some(capacity);
        self
    }

    /// Register a raw-payload handler.
    pub fn handle<F>(mut self, msg_id: u16, handler: F) -> Self
    where
        F: Fn(&SessionHandle, u16, &[u8]) -> HandlerResult + Send + Sync + 'static,
    {
        let result = self.registry.register(msg_id, handler);
        self.record(result);
        self
    }

    /// Register a handler receiving a JSON-decoded payload.
    pub fn handle_json<T, F>(mut self, msg_id: u16, handler: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&SessionHandle, T) -> HandlerResult + Send + Sync + 'static,
    {
        let result = self.registry.register_json(msg_id, handler);
        self.record(result);
        self
    }

    /// Register a handler receiving a MsgPack-decoded payload.
    pub fn handle_msgpack<T, F>(mut self, msg_id: u16, handler: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&SessionHandle, T) -> HandlerResult + Send + Sync + 'static,
    {
        let result = self.registry.register_msgpack(msg_id, handler);
        self.record(result);
        self
    }

    /// Register any [`Handler`] implementation.
    pub fn handler<H: Handler>(mut self, msg_id: u16, handler: H) -> Self {
        let result = self.registry.register_handler(msg_id, handler);
        self.record(result);
        self
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.registration_error.get_or_insert(e);
        }
    }

    /// Validate the configuration, bind, and start serving.
    pub async fn start(self) -> Result<Server> {
        if let Some(e) = self.registration_error {
            return Err(e);
        }
        self.config.validate()?;
        Server::start(self.config, self.registry).await
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running server.
pub struct Server {
    local_addr: SocketAddr,
    sessions: SessionTable,
    logic: Option<LogicSystem>,
    logic_handle: LogicHandle,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
    close_timeout: Duration,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    async fn start(config: ServerConfig, registry: CallbackRegistry) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let logic = LogicSystem::start(registry, config.logic_config())?;
        let logic_handle = logic.handle();

        let sessions: SessionTable = Arc::new(DashMap::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            sessions.clone(),
            config.session_config(),
            logic_handle.clone(),
            shutdown_rx,
        ));

        tracing::info!("Listening on {}", local_addr);

        Ok(Server {
            local_addr,
            sessions,
            logic: Some(logic),
            logic_handle,
            shutdown_tx,
            accept_task: Some(accept_task),
            close_timeout: config.close_timeout(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Look up a live session by id.
    pub fn session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of all live sessions.
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Handle for posting items to the logic worker directly.
    pub fn logic_handle(&self) -> LogicHandle {
        self.logic_handle.clone()
    }

    /// Stop the server.
    ///
    /// Stops accepting and waits for the logic worker to finish every queued
    /// item. Then every session is drained: reading stops and frames already
    /// queued are written out. Sessions still flushing after the close
    /// timeout are closed.
    pub async fn shutdown(mut self) -> WorkerStats {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::error!("Accept task aborted: {}", e);
            }
        }

        let stats = match self.logic.take() {
            Some(logic) => tokio::task::spawn_blocking(move || logic.stop())
                .await
                .unwrap_or_default(),
            None => WorkerStats::default(),
        };

        self.drain_sessions().await;
        tracing::info!("Server on {} stopped", self.local_addr);
        stats
    }

    async fn drain_sessions(&self) {
        let sessions = self.sessions();
        for session in &sessions {
            session.drain();
        }

        let deadline = tokio::time::Instant::now() + self.close_timeout;
        for session in &sessions {
            if tokio::time::timeout_at(deadline, session.closed()).await.is_err() {
                tracing::warn!(
                    "Session {} still flushing at shutdown, closing ({} frames pending)",
                    session.id(),
                    session.pending_sends()
                );
                session.close();
            }
        }
    }

    fn close_sessions(&self) {
        for entry in self.sessions.iter() {
            entry.value().close();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(logic) = self.logic.take() {
            // Joining here could stall the runtime; let the worker drain on its own thread.
            std::thread::spawn(move || drop(logic));
        }
        self.close_sessions();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

fn ceil_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    let rounded = if duration.subsec_nanos() % 1_000_000 != 0 {
        millis + 1
    } else {
        millis
    };
    u64::try_from(rounded).unwrap_or(u64::MAX)
}

/// Resolve once the shutdown flag is set (or its sender is gone).
async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    sessions: SessionTable,
    config: SessionConfig,
    logic: LogicHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown_signal(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let (session, driver) = Session::spawn(stream, Some(peer), &config, logic.clone());
        let id = session.id().to_string();
        tracing::info!("Accepted {} as session {}", peer, id);
        sessions.insert(id.clone(), session);

        let table = sessions.clone();
        tokio::spawn(async move {
            if let Err(e) = driver.await {
                tracing::error!("Session {} driver aborted: {}", id, e);
            }
            table.remove(&id);
        });
    }

    tracing::debug!("Accept loop stopped");
}
