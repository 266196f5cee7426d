//! Command Arguments
//!
//! [`CommandArgs`] keeps the typed arguments of a command in order. Keys and
//! values stay typed until the frame is written, then go through the
//! connection's [`Codec`].

use crate::codec::{Codec, CodecError};
use crate::protocol::types::{write_bulk, write_bulk_header, CRLF};
use bytes::{Bytes, BytesMut};

/// Framing around one bulk argument: `$`, two length digits, two CRLFs.
const BULK_OVERHEAD: usize = 7;

/// A single command argument.
#[derive(Debug, Clone, PartialEq)]
enum Arg<K, V> {
    Key(K),
    Value(V),
    Integer(i64),
    Literal(&'static str),
    Bytes(Bytes),
}

/// Ordered arguments of one command.
///
/// # Example
///
/// ```
/// use flashkv_client::codec::StringCodec;
/// use flashkv_client::command::CommandArgs;
///
/// let args = CommandArgs::<StringCodec>::new()
///     .add_key("session")
///     .add_value("token")
///     .add_literal("EX")
///     .add_integer(60);
/// assert_eq!(args.len(), 4);
/// ```
pub struct CommandArgs<C: Codec> {
    args: Vec<Arg<C::Key, C::Value>>,
}

impl<C: Codec> CommandArgs<C> {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    pub fn add_key(mut self, key: impl Into<C::Key>) -> Self {
        self.args.push(Arg::Key(key.into()));
        self
    }

    pub fn add_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<C::Key>,
    {
        self.args.extend(keys.into_iter().map(|k| Arg::Key(k.into())));
        self
    }

    pub fn add_value(mut self, value: impl Into<C::Value>) -> Self {
        self.args.push(Arg::Value(value.into()));
        self
    }

    pub fn add_values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<C::Value>,
    {
        self.args
            .extend(values.into_iter().map(|v| Arg::Value(v.into())));
        self
    }

    pub fn add_integer(mut self, n: i64) -> Self {
        self.args.push(Arg::Integer(n));
        self
    }

    /// Adds a protocol token such as `EX` or `NX`.
    pub fn add_literal(mut self, literal: &'static str) -> Self {
        self.args.push(Arg::Literal(literal));
        self
    }

    /// Adds pre-encoded bytes, bypassing the codec.
    pub fn add_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.args.push(Arg::Bytes(bytes.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Approximate encoded size of all arguments, framing included.
    pub fn estimate_size(&self, codec: &C) -> usize {
        self.args
            .iter()
            .map(|arg| {
                let payload = match arg {
                    Arg::Key(k) => codec.estimate_key_size(k),
                    Arg::Value(v) => codec.estimate_value_size(v),
                    Arg::Integer(_) => 20,
                    Arg::Literal(l) => l.len(),
                    Arg::Bytes(b) => b.len(),
                };
                payload + BULK_OVERHEAD
            })
            .sum()
    }

    /// Writes every argument as a bulk string.
    ///
    /// On error `target` may hold a partial frame; callers encode into a
    /// private buffer and discard it.
    pub fn encode(&self, codec: &C, target: &mut BytesMut) -> Result<(), CodecError> {
        let mut scratch = BytesMut::new();

        for arg in &self.args {
            match arg {
                Arg::Key(k) => {
                    scratch.clear();
                    scratch.reserve(codec.estimate_key_size(k));
                    codec.encode_key(Some(k), &mut scratch)?;
                    write_encoded(target, &scratch);
                }
                Arg::Value(v) => {
                    scratch.clear();
                    scratch.reserve(codec.estimate_value_size(v));
                    codec.encode_value(Some(v), &mut scratch)?;
                    write_encoded(target, &scratch);
                }
                Arg::Integer(n) => write_bulk(target, n.to_string().as_bytes()),
                Arg::Literal(l) => write_bulk(target, l.as_bytes()),
                Arg::Bytes(b) => write_bulk(target, b),
            }
        }

        Ok(())
    }
}

fn write_encoded(target: &mut BytesMut, encoded: &[u8]) {
    write_bulk_header(target, encoded.len());
    target.extend_from_slice(encoded);
    target.extend_from_slice(CRLF);
}

impl<C: Codec> Default for CommandArgs<C> {
    fn default() -> Self {
        Self::new()
    }
}
