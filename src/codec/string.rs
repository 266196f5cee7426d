//! Charset-Aware String Codec
//!
//! [`StringCodec`] encodes `String` keys and values straight into a caller
//! supplied [`BytesMut`], so encoding a command does not allocate per
//! argument.
//!
//! ## Encoding Strategies
//!
//! The strategy is picked once, when the codec is built:
//!
//! ```text
//! Charset::Utf8   ──▶ Strategy::Utf8     copy the str bytes as-is
//! Charset::Ascii  ──▶ Strategy::Ascii    low byte of chars up to 0xFF, '?' above
//! everything else ──▶ Strategy::Generic  reserve the max bound, transcode
//!                                        char by char, fail on unmappable
//! ```
//!
//! ## Size Calculation
//!
//! `calculate_string_bytes(value, false)` is an upper bound
//! (`max_bytes_per_char * chars`) that is safe to reserve before encoding.
//! `calculate_string_bytes(value, true)` uses the average bytes per char and
//! is only a pre-sizing hint.

use super::{Charset, Codec, CodecError};
use bytes::{BufMut, BytesMut};

/// Replacement written by the ASCII fast path for characters above 0xFF.
const ASCII_REPLACEMENT: u8 = b'?';

/// How a [`StringCodec`] turns characters into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Utf8,
    Ascii,
    Generic,
}

impl Strategy {
    fn for_charset(charset: Charset) -> Self {
        match charset {
            Charset::Utf8 => Strategy::Utf8,
            Charset::Ascii => Strategy::Ascii,
            Charset::Latin1 | Charset::Utf16Be | Charset::Utf16Le => Strategy::Generic,
        }
    }
}

/// Encodes and decodes `String` keys and values using a fixed [`Charset`].
///
/// The codec is immutable, so one instance can serve every connection.
///
/// # Example
///
/// ```
/// use flashkv_client::codec::{Charset, Codec, StringCodec};
///
/// let codec = StringCodec::new(Charset::Latin1);
/// let bytes = codec.encode_value_to_bytes(Some(&"café".to_string())).unwrap();
/// assert_eq!(&bytes[..], b"caf\xe9");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringCodec {
    charset: Charset,
    strategy: Strategy,
}

impl StringCodec {
    /// Creates a codec bound to `charset`.
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            strategy: Strategy::for_charset(charset),
        }
    }

    /// UTF-8 codec.
    pub fn utf8() -> Self {
        Self::new(Charset::Utf8)
    }

    /// US-ASCII codec.
    pub fn ascii() -> Self {
        Self::new(Charset::Ascii)
    }

    /// The charset this codec is bound to.
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Encodes `value` into `target`. `None` writes nothing.
    pub fn encode(&self, value: Option<&str>, target: &mut BytesMut) -> Result<(), CodecError> {
        let value = match value {
            Some(v) => v,
            None => return Ok(()),
        };

        match self.strategy {
            Strategy::Utf8 => {
                target.extend_from_slice(value.as_bytes());
                Ok(())
            }
            Strategy::Ascii => {
                target.reserve(self.calculate_string_bytes(value, false));
                for ch in value.chars() {
                    let code = ch as u32;
                    target.put_u8(if code <= 0xFF { code as u8 } else { ASCII_REPLACEMENT });
                }
                Ok(())
            }
            Strategy::Generic => self.encode_generic(value, target),
        }
    }

    fn encode_generic(&self, value: &str, target: &mut BytesMut) -> Result<(), CodecError> {
        let start = target.len();
        target.reserve(self.calculate_string_bytes(value, false));

        for (index, ch) in value.chars().enumerate() {
            if let Err(e) = self.encode_char(ch, index, target) {
                target.truncate(start);
                return Err(e);
            }
        }

        Ok(())
    }

    fn encode_char(&self, ch: char, index: usize, target: &mut BytesMut) -> Result<(), CodecError> {
        match self.charset {
            Charset::Latin1 => {
                let code = ch as u32;
                if code > 0xFF {
                    return Err(CodecError::Unmappable {
                        ch,
                        index,
                        charset: self.charset,
                    });
                }
                target.put_u8(code as u8);
            }
            Charset::Utf16Be => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    target.put_u16(*unit);
                }
            }
            Charset::Utf16Le => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    target.put_u16_le(*unit);
                }
            }
            Charset::Utf8 | Charset::Ascii => {
                let mut utf8 = [0u8; 4];
                target.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
            }
        }
        Ok(())
    }

    /// Decodes a complete byte span into a `String`.
    ///
    /// Malformed input is replaced with U+FFFD rather than rejected.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self.charset {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Charset::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            Charset::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        }
    }

    /// Byte length of `value` in this charset.
    ///
    /// With `estimate == false` the result is `max_bytes_per_char * chars`,
    /// an upper bound computed in integers so it never undercounts. With
    /// `estimate == true` it is `average_bytes_per_char * chars`, rounded
    /// down.
    pub fn calculate_string_bytes(&self, value: &str, estimate: bool) -> usize {
        let chars = value.chars().count();
        if estimate {
            (self.charset.average_bytes_per_char() * chars as f32) as usize
        } else {
            self.charset.max_bytes_per_char().saturating_mul(chars)
        }
    }

    /// Pre-sizing hint for `value`.
    pub fn estimate_size(&self, value: &str) -> usize {
        self.calculate_string_bytes(value, true)
    }
}

impl Default for StringCodec {
    /// Codec bound to the host default charset.
    fn default() -> Self {
        Self::new(Charset::host_default())
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    let mut out: String = char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if bytes.len() % 2 != 0 {
        out.push(char::REPLACEMENT_CHARACTER);
    }
    out
}

impl Codec for StringCodec {
    type Key = String;
    type Value = String;

    fn encode_key(&self, key: Option<&String>, target: &mut BytesMut) -> Result<(), CodecError> {
        self.encode(key.map(String::as_str), target)
    }

    fn encode_value(&self, value: Option<&String>, target: &mut BytesMut) -> Result<(), CodecError> {
        self.encode(value.map(String::as_str), target)
    }

    fn decode_key(&self, bytes: &[u8]) -> Result<String, CodecError> {
        Ok(self.decode(bytes))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<String, CodecError> {
        Ok(self.decode(bytes))
    }

    fn estimate_key_size(&self, key: &String) -> usize {
        self.estimate_size(key)
    }

    fn estimate_value_size(&self, value: &String) -> usize {
        self.estimate_size(value)
    }
}
