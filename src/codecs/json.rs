//! JSON Codec using `serde_json`

use crate::error::CacheResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON Codec using `serde_json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Serialize a value into a payload
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialization` if the value cannot be encoded.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> CacheResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Deserialize a payload into the caller's expected shape
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialization` if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(self, payload: &str) -> CacheResult<T> {
        Ok(serde_json::from_str(payload)?)
    }
}
