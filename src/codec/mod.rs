//! Codec module - structured payload encoding for typed handlers.
//!
//! Frame payloads are raw bytes. Handlers that want structured data can be
//! registered through a codec:
//!
//! - [`JsonCodec`] - JSON using `serde_json`
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (struct-as-map format)
//!
//! Codecs are marker structs implementing [`PayloadCodec`] with static
//! methods, so the codec is chosen at compile time.
//!
//! # Example
//!
//! ```
//! use sessionwire::codec::{JsonCodec, PayloadCodec};
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! let decoded: String = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod json;
mod msgpack;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

/// Static encode/decode pair for handler payloads.
pub trait PayloadCodec: Send + Sync + 'static {
    /// Short name used in log messages.
    const NAME: &'static str;

    /// Encode a value to payload bytes.
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>>;

    /// Decode payload bytes to a value.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}
