//! Raw Byte Codec
//!
//! Pass-through codec for callers that already hold binary keys and values.

use super::{Codec, CodecError};
use bytes::{Bytes, BytesMut};

/// Codec for `Bytes` keys and values. Encoding is a plain copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteArrayCodec;

impl ByteArrayCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for ByteArrayCodec {
    type Key = Bytes;
    type Value = Bytes;

    fn encode_key(&self, key: Option<&Bytes>, target: &mut BytesMut) -> Result<(), CodecError> {
        if let Some(key) = key {
            target.extend_from_slice(key);
        }
        Ok(())
    }

    fn encode_value(&self, value: Option<&Bytes>, target: &mut BytesMut) -> Result<(), CodecError> {
        if let Some(value) = value {
            target.extend_from_slice(value);
        }
        Ok(())
    }

    fn decode_key(&self, bytes: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(bytes))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(bytes))
    }

    fn estimate_key_size(&self, key: &Bytes) -> usize {
        key.len()
    }

    fn estimate_value_size(&self, value: &Bytes) -> usize {
        value.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_passthrough() {
        let codec = ByteArrayCodec::new();
        let value = Bytes::from(&b"hel\x00o\xff"[..]);
        let encoded = codec.encode_value_to_bytes(Some(&value)).unwrap();
        assert_eq!(encoded, value);
        assert_eq!(codec.decode_value(&encoded).unwrap(), value);
        assert_eq!(codec.estimate_value_size(&value), 6);
    }

    #[test]
    fn test_none_is_empty() {
        let codec = ByteArrayCodec::new();
        let mut buf = BytesMut::new();
        codec.encode_key(None, &mut buf).unwrap();
        assert!(buf.is_empty());
    }
}
