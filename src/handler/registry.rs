//! Callback registry for dispatching messages by identifier.
//!
//! The registry maps message-type identifiers to handlers. It is filled
//! once before the logic worker starts and then moved into the worker
//! thread, so lookups never take a lock and nothing can mutate it while
//! messages are being dispatched.
//!
//! # Example
//!
//! ```
//! use serde::Deserialize;
//! use sessionwire::handler::CallbackRegistry;
//!
//! #[derive(Deserialize)]
//! struct Hello {
//!     data: String,
//! }
//!
//! let mut registry = CallbackRegistry::new();
//!
//! registry
//!     .register(1, |session, msg_id, payload| session.send(msg_id, payload))
//!     .unwrap();
//!
//! registry
//!     .register_json(1001, |session, hello: Hello| session.send(1001, hello.data))
//!     .unwrap();
//!
//! assert!(registry.contains(1001));
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::codec::{JsonCodec, MsgPackCodec, PayloadCodec};
use crate::error::{SessionwireError, Result};
use crate::session::SessionHandle;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Trait for message handlers.
///
/// Handlers run on the logic worker thread. They may call
/// `session.send(..)` any number of times, and should return promptly:
/// a slow handler delays every message queued behind it.
pub trait Handler: Send + Sync + 'static {
    /// Handle one message.
    fn call(&self, session: &SessionHandle, msg_id: u16, payload: &[u8]) -> HandlerResult;
}

/// Adapter turning a closure into a [`Handler`].
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&SessionHandle, u16, &[u8]) -> HandlerResult + Send + Sync + 'static,
{
    #[inline]
    fn call(&self, session: &SessionHandle, msg_id: u16, payload: &[u8]) -> HandlerResult {
        (self.0)(session, msg_id, payload)
    }
}

/// Wrapper that decodes the payload with codec `C` before calling the handler.
pub struct TypedHandler<C, F, T> {
    handler: F,
    _phantom: PhantomData<fn() -> (C, T)>,
}

impl<C, F, T> TypedHandler<C, F, T>
where
    C: PayloadCodec,
    F: Fn(&SessionHandle, T) -> HandlerResult + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<C, F, T> Handler for TypedHandler<C, F, T>
where
    C: PayloadCodec,
    F: Fn(&SessionHandle, T) -> HandlerResult + Send + Sync + 'static,
    T: DeserializeOwned + 'static,
{
    fn call(&self, session: &SessionHandle, msg_id: u16, payload: &[u8]) -> HandlerResult {
        let value: T = C::decode(payload).map_err(|e| {
            tracing::debug!("Failed to decode {} payload for message {}: {}", C::NAME, msg_id, e);
            e
        })?;
        (self.handler)(session, value)
    }
}

/// Registry mapping message identifiers to handlers.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: HashMap<u16, Box<dyn Handler>>,
}

impl CallbackRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure receiving the raw payload.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateHandler` if `msg_id` is taken; the existing handler is kept.
    pub fn register<F>(&mut self, msg_id: u16, handler: F) -> Result<()>
    where
        F: Fn(&SessionHandle, u16, &[u8]) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(msg_id, FnHandler(handler))
    }

    /// Register a closure receiving a JSON-decoded payload.
    pub fn register_json<T, F>(&mut self, msg_id: u16, handler: F) -> Result<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&SessionHandle, T) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(msg_id, TypedHandler::<JsonCodec, F, T>::new(handler))
    }

    /// Register a closure receiving a MsgPack-decoded payload.
    pub fn register_msgpack<T, F>(&mut self, msg_id: u16, handler: F) -> Result<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&SessionHandle, T) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(msg_id, TypedHandler::<MsgPackCodec, F, T>::new(handler))
    }

    /// Register any [`Handler`] implementation.
    pub fn register_handler<H: Handler>(&mut self, msg_id: u16, handler: H) -> Result<()> {
        if self.handlers.contains_key(&msg_id) {
            return Err(SessionwireError::DuplicateHandler(msg_id));
        }
        self.handlers.insert(msg_id, Box::new(handler));
        Ok(())
    }

    /// Get a handler by message identifier.
    pub fn get(&self, msg_id: u16) -> Option<&dyn Handler> {
        self.handlers.get(&msg_id).map(|h| h.as_ref())
    }

    /// Check if a handler is registered for `msg_id`.
    #[inline]
    pub fn contains(&self, msg_id: u16) -> bool {
        self.handlers.contains_key(&msg_id)
    }

    /// Registered identifiers, in ascending order.
    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered handlers.
    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handlers are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch a message to its handler.
    ///
    /// Returns `HandlerNotFound` for unregistered identifiers.
    pub fn dispatch(&self, session: &SessionHandle, msg_id: u16, payload: &[u8]) -> HandlerResult {
        let handler = self
            .get(msg_id)
            .ok_or(SessionwireError::HandlerNotFound(msg_id))?;

        handler.call(session, msg_id, payload)
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
