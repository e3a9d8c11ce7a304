// src/charset/mod.rs

//! Character sets used to turn raw process bytes into text and journal
//! records back into bytes.
//!
//! Both directions never fail on bad input:
//! - decoding substitutes U+FFFD for malformed or truncated sequences
//!   (see [`Decoder`]),
//! - encoding substitutes `?` for characters the target set cannot represent.

pub mod decoder;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub use decoder::Decoder;

/// Replacement emitted by the decoder.
pub const REPLACEMENT_CHAR: char = '\u{FFFD}';

/// Replacement emitted by the encoder for unmappable characters.
pub const REPLACEMENT_BYTE: u8 = b'?';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl Charset {
    /// Canonical name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Utf16Le => "utf-16le",
            Charset::Utf16Be => "utf-16be",
            Charset::Latin1 => "iso-8859-1",
            Charset::Ascii => "us-ascii",
        }
    }

    /// Fresh streaming decoder for this charset.
    pub fn decoder(self) -> Decoder {
        Decoder::new(self)
    }

    /// Encode `text`, appending the bytes to `out`.
    pub fn encode_into(self, text: &str, out: &mut Vec<u8>) {
        match self {
            Charset::Utf8 => out.extend_from_slice(text.as_bytes()),
            Charset::Utf16Le => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            Charset::Utf16Be => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
            }
            Charset::Latin1 => out.extend(text.chars().map(|c| {
                u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT_BYTE)
            })),
            Charset::Ascii => out.extend(text.chars().map(|c| {
                if c.is_ascii() {
                    c as u8
                } else {
                    REPLACEMENT_BYTE
                }
            })),
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len());
        self.encode_into(text, &mut out);
        out
    }

    /// One-shot decode of a complete byte sequence.
    pub fn decode(self, bytes: &[u8]) -> String {
        let mut decoder = self.decoder();
        let mut out = String::with_capacity(bytes.len());
        decoder.decode(bytes, &mut out, true);
        out
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "utf-16le" | "utf16le" => Ok(Charset::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Charset::Utf16Be),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Charset::Latin1),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            other => Err(format!("unsupported charset: {other}")),
        }
    }
}

impl TryFrom<String> for Charset {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
