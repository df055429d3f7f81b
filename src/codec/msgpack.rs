//! MsgPack codec using `rmp-serde`.
//!
//! Always uses `to_vec_named`: structs are serialized as maps with field
//! names, so peers decoding by field name (and schema changes that reorder
//! fields) keep working.
//!
//! # Example
//!
//! ```
//! use sessionwire::codec::{MsgPackCodec, PayloadCodec};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Message = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PayloadCodec;
use crate::error::Result;

/// MessagePack codec for structured payloads.
///
/// Uses `rmp_serde::to_vec_named` so structs are serialized as maps
/// rather than arrays (positional).
pub struct MsgPackCodec;

impl PayloadCodec for MsgPackCodec {
    const NAME: &'static str = "msgpack";

    #[inline]
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
