//! Value codecs for the view's read boundary
//!
//! # Example
//!
//! ```
//! use vista::codec::{Int64Codec, JsonCodec};
//! use vista::Codec;
//! use serde::{Deserialize, Serialize};
//!
//! # fn main() -> vista::Result<()> {
//! let bytes = Int64Codec.encode(&42)?;
//! assert_eq!(bytes, b"42");
//! assert_eq!(Int64Codec.decode(&bytes)?, 42);
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Account {
//!     balance: i64,
//! }
//!
//! let codec = JsonCodec::<Account>::new();
//! let bytes = codec.encode(&Account { balance: 10 })?;
//! assert_eq!(codec.decode(&bytes)?, Account { balance: 10 });
//! # Ok(())
//! # }
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use vista_core::{Codec, Result, VistaError};

/// UTF-8 strings
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec for StringCodec {
    type Value = String;

    fn encode(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| VistaError::Codec(format!("invalid utf-8 value: {}", e)))
    }

    fn name(&self) -> &str {
        "string"
    }
}

/// 64-bit integers in decimal text form
#[derive(Debug, Clone, Copy, Default)]
pub struct Int64Codec;

impl Codec for Int64Codec {
    type Value = i64;

    fn encode(&self, value: &i64) -> Result<Vec<u8>> {
        Ok(value.to_string().into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<i64> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| VistaError::Codec(format!("invalid utf-8 value: {}", e)))?;
        text.trim()
            .parse::<i64>()
            .map_err(|e| VistaError::Codec(format!("invalid int64 {:?}: {}", text, e)))
    }

    fn name(&self) -> &str {
        "int64"
    }
}

/// Raw bytes, passed through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    type Value = Vec<u8>;

    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        "bytes"
    }
}

/// JSON documents of type `T`
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn name(&self) -> &str {
        "json"
    }
}
