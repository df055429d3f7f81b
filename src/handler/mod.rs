//! Handler module - message handling and dispatch.
//!
//! Provides:
//! - [`CallbackRegistry`] - maps message identifiers to handlers
//! - [`Handler`] - the interface every handler implements
//!
//! # Example
//!
//! ```
//! use sessionwire::handler::CallbackRegistry;
//!
//! let mut registry = CallbackRegistry::new();
//!
//! // Echo every payload back under the same identifier
//! registry
//!     .register(1, |session, msg_id, payload| session.send(msg_id, payload))
//!     .unwrap();
//! ```

mod registry;

pub use registry::{CallbackRegistry, FnHandler, Handler, HandlerResult, TypedHandler};
