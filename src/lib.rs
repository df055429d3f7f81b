//! # sessionwire
//!
//! Length-prefixed TCP sessions with a single logic dispatch worker.
//!
//! Each frame on the wire is a 2-byte big-endian body length followed by
//! the body. A body carries a 2-byte message identifier and the payload.
//!
//! ## Architecture
//!
//! - **I/O plane** (tokio tasks): one read task and one writer task per
//!   session. The read task reassembles frames from arbitrary TCP chunks and
//!   posts completed messages to the dispatch queue.
//! - **Logic plane** (one OS thread): drains the dispatch queue in FIFO order
//!   and invokes the handler registered for each message identifier.
//!   Handlers reply through [`Session::send`], which never blocks.
//!
//! ## Example
//!
//! ```no_run
//! use sessionwire::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .handle(1, |session, msg_id, payload| session.send(msg_id, payload))
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backpressure;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod logic;
pub mod protocol;
pub mod server;
pub mod session;
pub mod writer;

pub use config::ServerConfig;
pub use error::{Result, SessionwireError};
pub use handler::{CallbackRegistry, Handler, HandlerResult};
pub use logic::{LogicConfig, LogicHandle, LogicItem, LogicSystem, WorkerStats};
pub use protocol::{Message, Reassembler};
pub use server::{Server, ServerBuilder};
pub use session::{Session, SessionConfig, SessionHandle, SessionState};
