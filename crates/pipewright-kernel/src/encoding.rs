//! Text encodings a stage can declare for its filter streams.
//!
//! External commands always exchange raw bytes through OS pipes. The
//! encoding only governs how a filter's text helpers (`next_line`,
//! `read_text`, `write_str`, ...) turn those bytes into strings and
//! back. A stage without an encoding is raw: the byte APIs work as usual and
//! the text helpers fall back to lossy UTF-8 decoding.

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownEncoding;

/// A supported text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// UTF-8, strict: invalid sequences are an `InvalidData` error.
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl Encoding {
    /// Canonical label, as accepted by `FromStr`.
    pub fn label(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }

    /// Decode bytes into a string.
    pub fn decode(&self, bytes: Vec<u8>) -> io::Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }

    /// Encode a string into bytes.
    ///
    /// Latin-1 rejects characters above U+00FF with `InvalidInput`.
    pub fn encode(&self, text: &str) -> io::Result<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("character {c:?} is not representable in latin-1"),
                        )
                    })
                })
                .collect(),
        }
    }
}

/// Decode with an optional encoding; `None` decodes lossily as UTF-8.
pub(crate) fn decode_with(encoding: Option<Encoding>, bytes: Vec<u8>) -> io::Result<String> {
    match encoding {
        Some(enc) => enc.decode(bytes),
        None => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Encode with an optional encoding; `None` writes the UTF-8 bytes as-is.
pub(crate) fn encode_with(encoding: Option<Encoding>, text: &str) -> io::Result<Vec<u8>> {
    match encoding {
        Some(enc) => enc.encode(text),
        None => Ok(text.as_bytes().to_vec()),
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Encoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            _ => Err(UnknownEncoding(s.to_string())),
        }
    }
}
