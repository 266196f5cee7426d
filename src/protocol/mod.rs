//! RESP Wire Format
//!
//! The client speaks the Redis Serialization Protocol (RESP) in both
//! directions:
//!
//! - **Outbound**: every command is an array of bulk strings
//!   (`*<n>\r\n$<len>\r\n<arg>\r\n...`). See [`types::write_array_header`]
//!   and [`types::write_bulk_header`].
//! - **Inbound**: replies are framed by [`RespParser`], one [`RespValue`] per
//!   complete reply, and handed to the output decoder of the command at the
//!   head of the in-flight queue.
//!
//! ## Example
//!
//! ```
//! use flashkv_client::protocol::{parse_message, RespValue};
//!
//! let (value, consumed) = parse_message(b"+PONG\r\n").unwrap().unwrap();
//! assert_eq!(value, RespValue::SimpleString("PONG".to_string()));
//! assert_eq!(consumed, 7);
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
