//! Command Descriptors
//!
//! A [`Command`] is everything the dispatcher needs to send one request and
//! route its reply: the protocol keyword, the ordered arguments and the
//! output decoder.
//!
//! ```text
//! Command { keyword, args, output }
//!     │
//!     ├── encode(codec) ──▶ *<n>\r\n$<len>\r\n<keyword>\r\n<args...>
//!     │
//!     └── output ─────────▶ moved into the pending entry, decodes the reply
//! ```
//!
//! ## Modules
//!
//! - `keyword`: command name tokens
//! - `args`: typed argument lists
//! - `output`: reply decoders

pub mod args;
pub mod keyword;
pub mod output;

pub use args::CommandArgs;
pub use keyword::{CommandType, ProtocolKeyword};
pub use output::{
    DecodeError, Decoded, IntegerOutput, MapOutput, OutputDecoder, PushOutput, RawOutput,
    StatusOutput, ValueListOutput, ValueOutput, ValueStreamOutput,
};

use crate::codec::{Codec, CodecError};
use crate::protocol::types::{write_array_header, write_bulk};
use bytes::{Bytes, BytesMut};

/// One command, ready to be dispatched.
pub struct Command<C: Codec, O: OutputDecoder> {
    keyword: Bytes,
    args: CommandArgs<C>,
    output: O,
}

impl<C: Codec, O: OutputDecoder> Command<C, O> {
    /// A command without arguments.
    pub fn new(keyword: impl ProtocolKeyword, output: O) -> Self {
        Self::with_args(keyword, output, CommandArgs::new())
    }

    /// A command with arguments.
    pub fn with_args(keyword: impl ProtocolKeyword, output: O, args: CommandArgs<C>) -> Self {
        Self {
            keyword: keyword.to_bytes(),
            args,
            output,
        }
    }

    /// The keyword, lossily decoded for logging.
    pub fn keyword(&self) -> String {
        String::from_utf8_lossy(&self.keyword).into_owned()
    }

    pub fn args(&self) -> &CommandArgs<C> {
        &self.args
    }

    /// Serializes the whole command frame.
    pub fn encode(&self, codec: &C) -> Result<BytesMut, CodecError> {
        let mut buf = BytesMut::with_capacity(
            16 + self.keyword.len() + self.args.estimate_size(codec),
        );
        write_array_header(&mut buf, 1 + self.args.len());
        write_bulk(&mut buf, &self.keyword);
        self.args.encode(codec, &mut buf)?;
        Ok(buf)
    }

    /// Splits off the output decoder once the frame is encoded.
    pub fn into_output(self) -> O {
        self.output
    }
}
