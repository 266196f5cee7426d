//! Output Decoders
//!
//! Every dispatched command carries an [`OutputDecoder`]. When a reply frame
//! reaches the head of the in-flight queue the decoder turns it into zero or
//! more typed values and says whether the command is finished. A decoder that
//! never finishes (see [`PushOutput`]) keeps the head of the queue for every
//! later frame, which is how subscription streams work.
//!
//! An error reply that arrives before any other frame of a command is its
//! whole reply: the dispatcher fails the stream without asking the decoder.
//! Once a command has started receiving frames, every later frame belongs to
//! it until the decoder reports completion, even after a failure. After a
//! failed frame the dispatcher asks [`OutputDecoder::is_complete`].

use crate::codec::{Codec, CodecError};
use crate::protocol::RespValue;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by an output decoder.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// The reply has a different RESP type than the decoder expects
    #[error("unexpected reply type: expected {expected}, got {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },

    /// The codec rejected a bulk payload
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The reply content is invalid for this command
    #[error("invalid reply: {0}")]
    Invalid(String),
}

impl DecodeError {
    fn unexpected(expected: &'static str, found: &RespValue) -> Self {
        DecodeError::UnexpectedType {
            expected,
            found: found.type_name(),
        }
    }
}

/// Values produced from one reply frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    /// Values in delivery order
    pub values: Vec<T>,
    /// True once the command expects no more frames
    pub complete: bool,
}

impl<T> Decoded<T> {
    /// A single value that finishes the command.
    pub fn done(value: T) -> Self {
        Self {
            values: vec![value],
            complete: true,
        }
    }

    /// Several values that finish the command.
    pub fn done_many(values: Vec<T>) -> Self {
        Self {
            values,
            complete: true,
        }
    }

    /// Values with more frames still to come.
    pub fn more(values: Vec<T>) -> Self {
        Self {
            values,
            complete: false,
        }
    }
}

/// Per-command reply decoding.
pub trait OutputDecoder: Send + 'static {
    /// Type of the values delivered to the result stream
    type Item: Send + 'static;

    /// Decodes one reply frame.
    fn decode(&mut self, reply: RespValue) -> Result<Decoded<Self::Item>, DecodeError>;

    /// Whether the command expects no further frames. Only consulted after
    /// `decode` failed; decoders spanning several frames must override it.
    fn is_complete(&self) -> bool {
        true
    }

    /// True for decoders that hold the head of the queue indefinitely.
    /// Error replies arriving meanwhile answer the commands queued behind.
    fn is_push(&self) -> bool {
        false
    }
}

/// Status replies such as `+OK` and `+PONG`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusOutput;

impl OutputDecoder for StatusOutput {
    type Item = String;

    fn decode(&mut self, reply: RespValue) -> Result<Decoded<String>, DecodeError> {
        match reply {
            RespValue::SimpleString(s) => Ok(Decoded::done(s)),
            RespValue::BulkString(b) => String::from_utf8(b.to_vec())
                .map(Decoded::done)
                .map_err(|e| DecodeError::Invalid(e.to_string())),
            other => Err(DecodeError::unexpected("simple string", &other)),
        }
    }
}

/// Integer replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerOutput;

impl OutputDecoder for IntegerOutput {
    type Item = i64;

    fn decode(&mut self, reply: RespValue) -> Result<Decoded<i64>, DecodeError> {
        match reply {
            RespValue::Integer(n) => Ok(Decoded::done(n)),
            other => Err(DecodeError::unexpected("integer", &other)),
        }
    }
}

/// A single bulk value decoded with the codec. Null becomes `None`.
pub struct ValueOutput<C: Codec> {
    codec: Arc<C>,
}

impl<C: Codec> ValueOutput<C> {
    pub fn new(codec: Arc<C>) -> Self {
        Self { codec }
    }
}

impl<C: Codec> OutputDecoder for ValueOutput<C> {
    type Item = Option<C::Value>;

    fn decode(&mut self, reply: RespValue) -> Result<Decoded<Self::Item>, DecodeError> {
        decode_optional(&*self.codec, reply).map(Decoded::done)
    }
}

/// An array of bulk values, delivered as one `Vec`.
pub struct ValueListOutput<C: Codec> {
    codec: Arc<C>,
}

impl<C: Codec> ValueListOutput<C> {
    pub fn new(codec: Arc<C>) -> Self {
        Self { codec }
    }
}

impl<C: Codec> OutputDecoder for ValueListOutput<C> {
    type Item = Vec<Option<C::Value>>;

    fn decode(&mut self, reply: RespValue) -> Result<Decoded<Self::Item>, DecodeError> {
        match reply {
            RespValue::Array(items) => items
                .into_iter()
                .map(|item| decode_optional(&*self.codec, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Decoded::done),
            RespValue::Null => Ok(Decoded::done(Vec::new())),
            other => Err(DecodeError::unexpected("array", &other)),
        }
    }
}

/// An array of bulk values, streamed one element at a time.
pub struct ValueStreamOutput<C: Codec> {
    codec: Arc<C>,
}

impl<C: Codec> ValueStreamOutput<C> {
    pub fn new(codec: Arc<C>) -> Self {
        Self { codec }
    }
}

impl<C: Codec> OutputDecoder for ValueStreamOutput<C> {
    type Item = Option<C::Value>;

    fn decode(&mut self, reply: RespValue) -> Result<Decoded<Self::Item>, DecodeError> {
        match reply {
            RespValue::Array(items) => items
                .into_iter()
                .map(|item| decode_optional(&*self.codec, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Decoded::done_many),
            RespValue::Null => Ok(Decoded::done_many(Vec::new())),
            other => Err(DecodeError::unexpected("array", &other)),
        }
    }
}

/// Raw frames, one per reply, never completing.
///
/// Used for subscriptions: the server keeps pushing frames for as long as
/// the subscription lives. Commands dispatched behind it only receive error
/// replies; any other frame is delivered here.
#[derive(Debug, Default, Clone, Copy)]
pub struct PushOutput;

impl OutputDecoder for PushOutput {
    type Item = RespValue;

    fn decode(&mut self, reply: RespValue) -> Result<Decoded<RespValue>, DecodeError> {
        Ok(Decoded::more(vec![reply]))
    }

    fn is_complete(&self) -> bool {
        false
    }

    fn is_push(&self) -> bool {
        true
    }
}

/// The raw reply frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawOutput;

impl OutputDecoder for RawOutput {
    type Item = RespValue;

    fn decode(&mut self, reply: RespValue) -> Result<Decoded<RespValue>, DecodeError> {
        Ok(Decoded::done(reply))
    }
}

/// Applies a function to every value of another decoder.
pub struct MapOutput<O, F, T> {
    inner: O,
    f: F,
    _item: PhantomData<fn() -> T>,
}

impl<O, F, T> MapOutput<O, F, T>
where
    O: OutputDecoder,
    F: FnMut(O::Item) -> T + Send + 'static,
    T: Send + 'static,
{
    pub fn new(inner: O, f: F) -> Self {
        Self {
            inner,
            f,
            _item: PhantomData,
        }
    }
}

impl<O, F, T> OutputDecoder for MapOutput<O, F, T>
where
    O: OutputDecoder,
    F: FnMut(O::Item) -> T + Send + 'static,
    T: Send + 'static,
{
    type Item = T;

    fn decode(&mut self, reply: RespValue) -> Result<Decoded<T>, DecodeError> {
        let decoded = self.inner.decode(reply)?;
        Ok(Decoded {
            values: decoded.values.into_iter().map(&mut self.f).collect(),
            complete: decoded.complete,
        })
    }

    fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }

    fn is_push(&self) -> bool {
        self.inner.is_push()
    }
}

fn decode_optional<C: Codec>(codec: &C, reply: RespValue) -> Result<Option<C::Value>, DecodeError> {
    match reply {
        RespValue::BulkString(bytes) => Ok(Some(codec.decode_value(&bytes)?)),
        RespValue::SimpleString(s) => Ok(Some(codec.decode_value(s.as_bytes())?)),
        RespValue::Null => Ok(None),
        other => Err(DecodeError::unexpected("bulk string", &other)),
    }
}
