//! Convenience Commands
//!
//! Thin wrappers that build a [`Command`](crate::command::Command) and hand
//! it to [`Connection::dispatch_command`](crate::connection::Connection::dispatch_command).
//! They add no behaviour of their own: the returned [`ResultStream`]
//! follows the same queueing, flushing and ordering rules as any other
//! dispatch.
//!
//! ## Supported Commands
//!
//! ### Server Commands
//! - `PING`, `ECHO`, `DBSIZE`
//!
//! ### String Commands
//! - `GET`, `SET`, `DEL`, `INCR`, `MGET`
//!
//! ### Pub/Sub Commands
//! - `PUBLISH`, `SUBSCRIBE`
//!
//! [`ResultStream`]: crate::connection::ResultStream

mod pubsub;
mod server;
mod string;
