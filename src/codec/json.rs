//! JSON codec using `serde_json`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PayloadCodec;
use crate::error::Result;

/// JSON codec for structured payloads.
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    const NAME: &'static str = "json";

    #[inline]
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionwireError;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Hello {
        id: u16,
        data: String,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Hello {
            id: 1001,
            data: "hello world".to_string(),
        };

        let encoded = JsonCodec::encode(&original).unwrap();
        let decoded: Hello = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decodes_foreign_json() {
        let decoded: Hello = JsonCodec::decode(br#"{"data":"hi","id":7}"#).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.data, "hi");
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Hello> = JsonCodec::decode(b"{not json");
        assert!(matches!(result, Err(SessionwireError::Json(_))));
    }
}
