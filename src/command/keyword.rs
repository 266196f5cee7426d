//! Protocol Keywords
//!
//! The first element of every command frame. Common commands have a
//! [`CommandType`]; anything else can be sent as a plain string.

use bytes::Bytes;
use std::fmt;

/// Something that can be written as the command name token.
pub trait ProtocolKeyword {
    /// The keyword as it goes on the wire.
    fn to_bytes(&self) -> Bytes;
}

/// Well-known command keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Ping,
    Echo,
    Get,
    Set,
    Del,
    Exists,
    Incr,
    Decr,
    Append,
    Strlen,
    Mget,
    Mset,
    Expire,
    Ttl,
    Publish,
    Subscribe,
    Dbsize,
    Flushdb,
    Info,
    Quit,
}

impl CommandType {
    /// The upper-case keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Ping => "PING",
            CommandType::Echo => "ECHO",
            CommandType::Get => "GET",
            CommandType::Set => "SET",
            CommandType::Del => "DEL",
            CommandType::Exists => "EXISTS",
            CommandType::Incr => "INCR",
            CommandType::Decr => "DECR",
            CommandType::Append => "APPEND",
            CommandType::Strlen => "STRLEN",
            CommandType::Mget => "MGET",
            CommandType::Mset => "MSET",
            CommandType::Expire => "EXPIRE",
            CommandType::Ttl => "TTL",
            CommandType::Publish => "PUBLISH",
            CommandType::Subscribe => "SUBSCRIBE",
            CommandType::Dbsize => "DBSIZE",
            CommandType::Flushdb => "FLUSHDB",
            CommandType::Info => "INFO",
            CommandType::Quit => "QUIT",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProtocolKeyword for CommandType {
    fn to_bytes(&self) -> Bytes {
        Bytes::from_static(self.as_str().as_bytes())
    }
}

impl ProtocolKeyword for &'static str {
    fn to_bytes(&self) -> Bytes {
        Bytes::from_static(self.as_bytes())
    }
}

impl ProtocolKeyword for String {
    fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}
