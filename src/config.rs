//! Server configuration.
//!
//! [`ServerConfig`] is the serializable top-level configuration. Every field
//! has a default, so a JSON document only needs the keys it overrides:
//!
//! ```
//! use sessionwire::config::ServerConfig;
//!
//! let config = ServerConfig::from_json_str(r#"{ "listen_addr": "0.0.0.0:9000" }"#).unwrap();
//! assert_eq!(config.listen_addr, "0.0.0.0:9000");
//! assert_eq!(config.max_body, 2048);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionwireError, Result};
use crate::logic::LogicConfig;
use crate::protocol::{MAX_BODY, MSG_ID_LENGTH};
use crate::session::{SessionConfig, DEFAULT_CLOSE_TIMEOUT, DEFAULT_READ_BUFFER_SIZE};
use crate::writer::DEFAULT_MAX_PENDING_FRAMES;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:10086";

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, `host:port`.
    pub listen_addr: String,
    /// Maximum frame body length.
    pub max_body: usize,
    /// Bytes requested from the socket per read.
    pub read_buffer_size: usize,
    /// Per-session limit on queued outbound frames.
    pub max_pending_sends: usize,
    /// Idle timeout in milliseconds (`None` = disabled).
    pub idle_timeout_ms: Option<u64>,
    /// Time a draining session may spend flushing, in milliseconds.
    pub close_timeout_ms: u64,
    /// Dispatch queue capacity (`None` = unbounded).
    pub dispatch_queue_capacity: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_body: MAX_BODY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_pending_sends: DEFAULT_MAX_PENDING_FRAMES,
            idle_timeout_ms: None,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT.as_millis() as u64,
            dispatch_queue_capacity: None,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_body < MSG_ID_LENGTH || self.max_body > u16::MAX as usize {
            return Err(SessionwireError::Config(format!(
                "max_body must be between {} and {}, got {}",
                MSG_ID_LENGTH,
                u16::MAX,
                self.max_body
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(SessionwireError::Config(
                "read_buffer_size must be greater than 0".into(),
            ));
        }
        if self.max_pending_sends == 0 {
            return Err(SessionwireError::Config(
                "max_pending_sends must be greater than 0".into(),
            ));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(SessionwireError::Config(
                "idle_timeout_ms must be greater than 0 (omit it to disable)".into(),
            ));
        }
        if self.dispatch_queue_capacity == Some(0) {
            return Err(SessionwireError::Config(
                "dispatch_queue_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    /// Close timeout as a `Duration`.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Per-session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_body: self.max_body,
            read_buffer_size: self.read_buffer_size,
            max_pending_sends: self.max_pending_sends,
            idle_timeout: self.idle_timeout(),
            close_timeout: self.close_timeout(),
        }
    }

    /// Logic worker settings derived from this config.
    pub fn logic_config(&self) -> LogicConfig {
        LogicConfig {
            queue_capacity: self.dispatch_queue_capacity,
            ..LogicConfig::default()
        }
    }
}
