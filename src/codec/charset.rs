//! Supported Charsets
//!
//! The set of charsets is closed: each one knows how many bytes a character
//! may take (`max_bytes_per_char`) and how many it takes on average
//! (`average_bytes_per_char`). Both statistics count Unicode scalar values,
//! not UTF-16 code units.

use super::CodecError;
use std::fmt;

/// Environment variables consulted, in order, for the host default charset.
const LOCALE_VARS: [&str; 3] = ["LC_ALL", "LC_CTYPE", "LANG"];

/// A character encoding a [`StringCodec`](super::StringCodec) can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    /// UTF-8
    Utf8,
    /// 7-bit US-ASCII
    Ascii,
    /// ISO-8859-1
    Latin1,
    /// UTF-16, big endian, no byte order mark
    Utf16Be,
    /// UTF-16, little endian, no byte order mark
    Utf16Le,
}

impl Charset {
    /// Looks a charset up by name. Matching ignores case, `-` and `_`.
    pub fn from_name(name: &str) -> Result<Self, CodecError> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "utf8" => Ok(Charset::Utf8),
            "ascii" | "usascii" | "ansix3.41968" => Ok(Charset::Ascii),
            "latin1" | "iso88591" | "l1" => Ok(Charset::Latin1),
            "utf16be" => Ok(Charset::Utf16Be),
            "utf16le" => Ok(Charset::Utf16Le),
            _ => Err(CodecError::UnsupportedCharset(name.to_string())),
        }
    }

    /// The charset of the host environment's locale.
    ///
    /// Reads `LC_ALL`, `LC_CTYPE` and `LANG` (first non-empty wins) and
    /// inspects the codeset after the `.`. `C` and `POSIX` select ASCII.
    /// Anything unset or unrecognised falls back to UTF-8.
    pub fn host_default() -> Self {
        let locale = LOCALE_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty());

        match locale {
            Some(locale) => Self::from_locale(&locale),
            None => Charset::Utf8,
        }
    }

    /// Derives a charset from a locale string such as `en_US.UTF-8`.
    pub fn from_locale(locale: &str) -> Self {
        if locale == "C" || locale == "POSIX" {
            return Charset::Ascii;
        }

        let codeset = locale
            .split_once('.')
            .map(|(_, rest)| rest.split('@').next().unwrap_or(rest));

        codeset
            .and_then(|cs| Self::from_name(cs).ok())
            .unwrap_or(Charset::Utf8)
    }

    /// Canonical name of the charset.
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Ascii => "US-ASCII",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
        }
    }

    /// Largest number of bytes a single character can encode to.
    pub fn max_bytes_per_char(&self) -> usize {
        match self {
            Charset::Utf8 => 4,
            Charset::Ascii | Charset::Latin1 => 1,
            Charset::Utf16Be | Charset::Utf16Le => 4,
        }
    }

    /// Typical number of bytes per character.
    pub fn average_bytes_per_char(&self) -> f32 {
        match self {
            Charset::Utf8 | Charset::Ascii | Charset::Latin1 => 1.0,
            Charset::Utf16Be | Charset::Utf16Le => 2.0,
        }
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::host_default()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
