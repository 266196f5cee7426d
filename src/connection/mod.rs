//! Connection Module
//!
//! A [`Connection`] pipelines commands over a single ordered transport.
//! Any `AsyncRead + AsyncWrite` works as transport: a `TcpStream` in
//! production, an in-memory duplex pipe in tests.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  dispatch   ┌──────────────────┐  frames   ┌──────────────┐
//! │ caller 1 │────────────>│                  │──────────>│ Writer Task  │──┐
//! ├──────────┤             │  DispatchState   │           └──────────────┘  │
//! │ caller 2 │────────────>│  (queue, flags)  │                             ▼
//! ├──────────┤             │                  │           ┌──────────────┐ transport
//! │ caller N │────────────>│                  │<──────────│ Reader Task  │<─┘
//! └────▲─────┘             └──────────────────┘  pop head └──────┬───────┘
//!      │                                                         │ decode
//!      └─────────────────── ResultStream <───────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Pipelining**: replies are matched to commands strictly in dispatch order
//! - **Auto-flush control**: batch many commands into a single write
//! - **Per-command errors**: decode and server errors only touch their own stream
//! - **Prompt failure**: on transport loss every waiting stream fails
//!
//! ## Example
//!
//! ```ignore
//! use flashkv_client::codec::StringCodec;
//! use flashkv_client::connection::{Connection, ConnectionConfig};
//!
//! let conn = Connection::connect("127.0.0.1:6379", StringCodec::utf8(), ConnectionConfig::default()).await?;
//! let pong = conn.ping()?.single().await?;
//! assert_eq!(pong, "PONG");
//! ```

pub mod dispatcher;
pub mod stream;


pub use dispatcher::{CommandError, Connection, ConnectionConfig, ConnectionStats};
pub use stream::ResultStream;
