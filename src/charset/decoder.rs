// src/charset/decoder.rs

//! Streaming decoder.
//!
//! Input arrives in arbitrary chunks (whatever a pipe read or a file read
//! returned), so a multi-byte sequence may be split across calls. The decoder
//! keeps the incomplete tail in `pending` and prepends it to the next chunk.
//! Only when the caller signals the end of input (`last = true`) is a
//! leftover incomplete sequence replaced with U+FFFD.

use super::{Charset, REPLACEMENT_CHAR};

#[derive(Debug, Clone)]
pub struct Decoder {
    charset: Charset,
    /// Bytes of an incomplete sequence carried over from the previous call.
    pending: Vec<u8>,
    /// UTF-16 only: a high surrogate waiting for its low half.
    high_surrogate: Option<u16>,
}

impl Decoder {
    pub fn new(charset: Charset) -> Self {
        Self {
            charset,
            pending: Vec::with_capacity(4),
            high_surrogate: None,
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// True if bytes are buffered waiting for the rest of a sequence.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.high_surrogate.is_some()
    }

    /// Bytes of an incomplete sequence held back from earlier input.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.high_surrogate = None;
    }

    /// Decode `input`, appending complete characters to `out`.
    ///
    /// With `last = true` any incomplete trailing sequence is flushed as a
    /// replacement character and the decoder is left empty.
    pub fn decode(&mut self, input: &[u8], out: &mut String, last: bool) {
        match self.charset {
            Charset::Utf8 => self.decode_utf8(input, out, last),
            Charset::Utf16Le => self.decode_utf16(input, out, last, u16::from_le_bytes),
            Charset::Utf16Be => self.decode_utf16(input, out, last, u16::from_be_bytes),
            Charset::Latin1 => out.extend(input.iter().map(|&b| char::from(b))),
            Charset::Ascii => out.extend(input.iter().map(|&b| {
                if b.is_ascii() {
                    char::from(b)
                } else {
                    REPLACEMENT_CHAR
                }
            })),
        }
    }

    /// Flush whatever is buffered, replacing incomplete sequences.
    pub fn finish(&mut self, out: &mut String) {
        self.decode(&[], out, true);
    }

    fn decode_utf8(&mut self, input: &[u8], out: &mut String, last: bool) {
        let joined;
        let mut rest: &[u8] = if self.pending.is_empty() {
            input
        } else {
            let mut buf = std::mem::take(&mut self.pending);
            buf.extend_from_slice(input);
            joined = buf;
            &joined
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // `valid` is guaranteed to be well-formed by `valid_up_to`.
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT_CHAR);
                            rest = &after[bad..];
                        }
                        None => {
                            // Truncated sequence at the end of the chunk.
                            if last {
                                out.push(REPLACEMENT_CHAR);
                            } else {
                                self.pending.extend_from_slice(after);
                            }
                            return;
                        }
                    }
                }
            }
        }
    }

    fn decode_utf16(
        &mut self,
        input: &[u8],
        out: &mut String,
        last: bool,
        to_unit: fn([u8; 2]) -> u16,
    ) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(input);

        let mut chunks = bytes.chunks_exact(2);
        for pair in &mut chunks {
            let unit = to_unit([pair[0], pair[1]]);
            self.push_utf16_unit(unit, out);
        }
        let odd = chunks.remainder();

        if last {
            if self.high_surrogate.take().is_some() {
                out.push(REPLACEMENT_CHAR);
            }
            if !odd.is_empty() {
                out.push(REPLACEMENT_CHAR);
            }
        } else {
            self.pending.extend_from_slice(odd);
        }
    }

    fn push_utf16_unit(&mut self, unit: u16, out: &mut String) {
        match (self.high_surrogate.take(), unit) {
            (Some(high), 0xDC00..=0xDFFF) => {
                let code = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                out.push(char::from_u32(code).unwrap_or(REPLACEMENT_CHAR));
            }
            (Some(_), 0xD800..=0xDBFF) => {
                out.push(REPLACEMENT_CHAR);
                self.high_surrogate = Some(unit);
            }
            (Some(_), _) => {
                out.push(REPLACEMENT_CHAR);
                out.push(char::from_u32(u32::from(unit)).unwrap_or(REPLACEMENT_CHAR));
            }
            (None, 0xD800..=0xDBFF) => self.high_surrogate = Some(unit),
            (None, 0xDC00..=0xDFFF) => out.push(REPLACEMENT_CHAR),
            (None, _) => out.push(char::from_u32(u32::from(unit)).unwrap_or(REPLACEMENT_CHAR)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_in_pieces(charset: Charset, bytes: &[u8], piece: usize) -> String {
        let mut decoder = Decoder::new(charset);
        let mut out = String::new();
        for chunk in bytes.chunks(piece) {
            decoder.decode(chunk, &mut out, false);
        }
        decoder.finish(&mut out);
        out
    }

    #[test]
    fn utf8_sequences_split_across_chunks() {
        let text = "héllo wörld ß 😀";
        for piece in 1..5 {
            assert_eq!(decode_in_pieces(Charset::Utf8, text.as_bytes(), piece), text);
        }
    }

    #[test]
    fn utf8_incomplete_tail_is_held_back() {
        let mut decoder = Decoder::new(Charset::Utf8);
        let mut out = String::new();
        // First two bytes of "€" (E2 82 AC).
        decoder.decode(&[b'a', 0xE2, 0x82], &mut out, false);
        assert_eq!(out, "a");
        assert!(decoder.has_pending());
        decoder.decode(&[0xAC], &mut out, false);
        assert_eq!(out, "a€");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn utf8_malformed_bytes_are_replaced() {
        let out = Charset::Utf8.decode(&[b'a', 0xFF, b'b', 0xC3]);
        assert_eq!(out, "a\u{FFFD}b\u{FFFD}");
    }

    #[test]
    fn utf16_le_split_surrogates() {
        let bytes = Charset::Utf16Le.encode("a😀b");
        for piece in 1..4 {
            assert_eq!(decode_in_pieces(Charset::Utf16Le, &bytes, piece), "a😀b");
        }
    }

    #[test]
    fn utf16_lone_surrogate_is_replaced() {
        // Lone low surrogate, then 'A'.
        let out = Charset::Utf16Be.decode(&[0xDC, 0x00, 0x00, 0x41]);
        assert_eq!(out, "\u{FFFD}A");
        // Dangling high surrogate at end of input.
        let out = Charset::Utf16Be.decode(&[0x00, 0x41, 0xD8, 0x3D]);
        assert_eq!(out, "A\u{FFFD}");
    }

    #[test]
    fn ascii_replaces_high_bytes() {
        assert_eq!(Charset::Ascii.decode(&[b'o', b'k', 0xE9]), "ok\u{FFFD}");
        assert_eq!(Charset::Latin1.decode(&[b'o', b'k', 0xE9]), "oké");
    }
}
