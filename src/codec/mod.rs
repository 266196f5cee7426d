//! Key/Value Codecs
//!
//! A codec turns typed keys and values into the raw bytes that travel inside
//! RESP bulk strings, and back again. Codecs are immutable once built and can
//! be shared freely between every caller on every connection.
//!
//! ## Codecs
//!
//! - [`StringCodec`]: `String` keys and values in a chosen [`Charset`]
//! - [`ByteArrayCodec`]: raw `Bytes` pass-through
//!
//! ## Example
//!
//! ```
//! use flashkv_client::codec::{Codec, StringCodec};
//! use bytes::BytesMut;
//!
//! let codec = StringCodec::utf8();
//! let mut buf = BytesMut::new();
//! codec.encode_value(Some(&"café".to_string()), &mut buf).unwrap();
//! assert_eq!(buf.len(), 5);
//! assert_eq!(codec.decode_value(&buf).unwrap(), "café");
//! ```

pub mod charset;
pub mod raw;
pub mod string;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

pub use charset::Charset;
pub use raw::ByteArrayCodec;
pub use string::StringCodec;

/// Errors raised while encoding or decoding keys and values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The charset cannot represent a character of the input
    #[error("character {ch:?} at index {index} is unmappable in {charset}")]
    Unmappable {
        ch: char,
        index: usize,
        charset: Charset,
    },

    /// The requested charset name is not supported
    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),
}

/// Converts typed keys and values to and from wire bytes.
///
/// `None` always encodes as zero bytes. Decoding receives a complete span.
pub trait Codec: Send + Sync + 'static {
    /// Key type
    type Key: Send + 'static;
    /// Value type
    type Value: Send + 'static;

    /// Writes `key` into `target`.
    fn encode_key(&self, key: Option<&Self::Key>, target: &mut BytesMut) -> Result<(), CodecError>;

    /// Writes `value` into `target`.
    fn encode_value(
        &self,
        value: Option<&Self::Value>,
        target: &mut BytesMut,
    ) -> Result<(), CodecError>;

    /// Reconstructs a key from `bytes`.
    fn decode_key(&self, bytes: &[u8]) -> Result<Self::Key, CodecError>;

    /// Reconstructs a value from `bytes`.
    fn decode_value(&self, bytes: &[u8]) -> Result<Self::Value, CodecError>;

    /// Approximate encoded size of a key, used only to pre-size buffers.
    fn estimate_key_size(&self, key: &Self::Key) -> usize;

    /// Approximate encoded size of a value, used only to pre-size buffers.
    fn estimate_value_size(&self, value: &Self::Value) -> usize;

    /// Encodes a key into a freshly allocated buffer.
    fn encode_key_to_bytes(&self, key: Option<&Self::Key>) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(key.map_or(0, |k| self.estimate_key_size(k)));
        self.encode_key(key, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Encodes a value into a freshly allocated buffer.
    fn encode_value_to_bytes(&self, value: Option<&Self::Value>) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(value.map_or(0, |v| self.estimate_value_size(v)));
        self.encode_value(value, &mut buf)?;
        Ok(buf.freeze())
    }
}
