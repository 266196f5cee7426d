//! # FlashKV Client - A Pipelining Command Dispatcher for Redis-Compatible Stores
//!
//! This crate is the command-dispatch core of a key-value store client. It
//! takes a command (keyword, arguments, output decoder), encodes it with a
//! charset-aware codec, queues it on a connection, writes it when the flush
//! policy says so, and delivers the decoded reply through an asynchronous
//! [`ResultStream`] in exactly the order the command was dispatched.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            flashkv-client                               │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────────┐ │
//! │  │  commands   │───>│  command    │───>│        connection            │ │
//! │  │ ping, get.. │    │ keyword,args│    │  queue ─ flush ─ writer task │ │
//! │  └─────────────┘    │ output      │    │    ▲                 │       │ │
//! │                     └──────┬──────┘    │    │ FIFO      transport     │ │
//! │                            │           │    │                 │       │ │
//! │                     ┌──────▼──────┐    │ reader task <── RESP parser  │ │
//! │                     │   codec     │    └──────────────┬───────────────┘ │
//! │                     │ UTF-8/ASCII │                   │                 │
//! │                     │ /generic    │            ResultStream<T>          │
//! │                     └─────────────┘                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashkv_client::{Connection, ConnectionConfig, StringCodec};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let conn = Connection::connect("127.0.0.1:6379", StringCodec::utf8(), ConnectionConfig::default()).await?;
//!
//!     // Pipeline three commands into a single write
//!     conn.set_auto_flush_commands(false);
//!     let set = conn.set("name", "Ariz")?;
//!     let get = conn.get("name")?;
//!     let receivers = conn.publish("news", "hello")?;
//!     conn.flush_commands();
//!
//!     assert_eq!(set.single().await?, "OK");
//!     assert_eq!(get.single().await?, Some("Ariz".to_string()));
//!     println!("delivered to {} subscribers", receivers.single().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`codec`]: key/value codecs and charsets
//! - [`protocol`]: RESP reply parser and frame writers
//! - [`command`]: command descriptors, arguments and output decoders
//! - [`connection`]: the dispatcher, its state machine and result streams
//! - [`commands`]: thin convenience methods on [`Connection`]
//!
//! ## Design Highlights
//!
//! ### Strict FIFO Pipelining
//!
//! Commands are admitted into the queue under a single lock that also
//! assigns their sequence number. The reader task pops the head of the
//! in-flight queue for each reply, so a command's values are always
//! delivered before any value of a command dispatched after it.
//!
//! ### Encoding Strategy Chosen Once
//!
//! [`StringCodec`] picks its UTF-8, ASCII or generic encoder when it is
//! built, never per call.
//!
//! ### Errors Stay With Their Command
//!
//! Encode errors are returned from the dispatch call. Decode and server
//! errors end only the affected stream. A transport failure fails every
//! waiting stream at once.

pub mod codec;
pub mod command;
pub mod commands;
pub mod connection;
pub mod protocol;

// Re-export commonly used types for convenience
pub use codec::{ByteArrayCodec, Charset, Codec, CodecError, StringCodec};
pub use command::{Command, CommandArgs, CommandType, OutputDecoder};
pub use connection::{CommandError, Connection, ConnectionConfig, ResultStream};
pub use protocol::{ParseError, RespParser, RespValue};

/// The default port of Redis-compatible servers
pub const DEFAULT_PORT: u16 = 6379;

/// The default host the client connects to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of flashkv-client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
